use crate::analysis::{AliasOracle, ValueToNodeMap};
use crate::datarando::randomizer::Randomizer;
use crate::datarando::report::{self, Report, Statistics};
use crate::datarando::safety::{SafetyClassifier, REASON_SAFE};
use crate::datarando::*;
use crate::il;
use crate::Error;
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Randomizes the data representation of modules.
///
/// A run classifies the storage nodes which may never be masked, instruments
/// every memory access, encrypts the command line and global initializers,
/// and finally redirects library calls to their mask-aware wrappers.
#[derive(Clone, Debug)]
pub struct DataRando {
    options: Options,
    catalog: LibraryWrapperCatalog,
}

impl DataRando {
    pub fn new(options: Options) -> Result<DataRando, Error> {
        Ok(DataRando {
            options,
            catalog: LibraryWrapperCatalog::new()?,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn catalog(&self) -> &LibraryWrapperCatalog {
        &self.catalog
    }

    /// Randomize `module` in place, with points-to information from `oracle`.
    pub fn run<O: AliasOracle + ?Sized>(
        &self,
        module: &mut il::Module,
        oracle: &O,
    ) -> Result<Report, Error> {
        let mut graph = oracle.points_to(module)?;
        let call_graph = oracle.call_graph(module)?;
        let values = ValueToNodeMap::build(&graph);
        debug!(
            "{} storage nodes, {} mapped values",
            graph.num_nodes(),
            values.len()
        );

        let mut statistics = Statistics::default();
        let classification =
            SafetyClassifier::new(module, &values, &call_graph, &self.catalog, &self.options)
                .classify(&mut graph, &mut statistics)?;

        let salt = self.options.salt().unwrap_or_else(|| module.name()).to_string();
        let generator = MaskGenerator::new(
            self.options.seed(),
            &salt,
            self.options.effective_mask_size(),
        );
        let mut registry = EquivalenceClassRegistry::new(graph, values, generator);
        for node in &classification.safe_nodes {
            registry.assign_null(*node, REASON_SAFE);
        }

        let layout = module.layout();
        let randomizer = Randomizer::new(
            &layout,
            registry.effective_mask_size(),
            self.options.always_emit_mask_alignment(),
        );

        let mut instrumenter =
            AccessInstrumenter::new(&mut registry, randomizer.clone(), &self.catalog);
        instrumenter.instrument_module(module)?;
        statistics.instrumented = instrumenter.instrumented();

        MainArgsEncryptor::new(&mut registry, &self.catalog, &layout).encrypt_main_args(module)?;

        statistics.encrypted_globals = GlobalInitializer::new(&mut registry, randomizer, &self.catalog)
            .encrypt_globals(module)?;

        let mut rewriter = LibraryCallRewriter::new(&mut registry, &self.catalog, &layout);
        rewriter.rewrite_module(module)?;
        statistics.wrapped_calls = rewriter.wrapped();

        statistics.gather(&registry);
        statistics.log();

        if let Some(path) = self.options.print_equivalence_classes_to() {
            write_to(path, |writer| report::write_equivalence_classes(&registry, writer))?;
            info!("Wrote equivalence classes to {}", path.display());
        }
        if let Some(path) = self.options.print_usage_counts_to() {
            write_to(path, |writer| report::write_usage_counts(&registry, writer))?;
            info!("Wrote usage counts to {}", path.display());
        }
        if self.options.print_allocation_counts() {
            report::log_allocation_counts(&registry);
        }

        Ok(Report {
            statistics,
            masks: registry.masks().clone(),
            do_not_replace_address: classification.do_not_replace_address,
            fixed_point_reached: classification.fixed_point_reached,
        })
    }
}

fn write_to<F>(path: &Path, write: F) -> Result<(), Error>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), Error>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer)?;
    writer.flush()?;
    Ok(())
}
