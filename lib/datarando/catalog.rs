//! Library functions known to the randomization pass.
//!
//! Each wrapper takes the parameters of the function it wraps followed by one
//! mask for every pointer-reachable level of the return value and of each
//! fixed parameter. Wrappers of variadic functions take one further mask
//! for the variadic arguments, except for format functions, where every
//! variadic argument is followed by its own mask.

use crate::il::{FunctionType, Layout, Type};
use crate::Error;
use std::collections::BTreeMap;

/// Name of the stdio stream struct, which is never masked.
pub const FILE_STRUCT: &str = "struct._IO_FILE";

pub const XOR_MEM: &str = "drrt_xor_mem";
pub const MEMSET: &str = "drrt_memset";
pub const MEMMOVE: &str = "drrt_memmove";

/// The runtime routines called by randomized code.
const RUNTIME_HELPERS: &[(&str, &str)] = &[
    (XOR_MEM, "void (i8*, i64, i64)"),
    (MEMSET, "i8* (i8*, i32, i64, i64, i64)"),
    (MEMMOVE, "i8* (i8*, i8*, i64, i64, i64, i64)"),
];

/// `(function, wrapper, wrapper signature)`
const WRAPPERS: &[(&str, &str, &str)] = &[
    ("__not_main", "drrt_main", "i32 (i32, i8**, i64, i64)"),
    ("strtol", "drrt_strtol", "i64 (i8*, i8**, i32, i64, i64, i64)"),
    ("strtoll", "drrt_strtoll", "i64 (i8*, i8**, i32, i64, i64, i64)"),
    ("strtod", "drrt_strtod", "double (i8*, i8**, i64, i64, i64)"),
    ("strrchr", "drrt_strrchr", "i8* (i8*, i32, i64, i64)"),
    ("strchr", "drrt_strchr", "i8* (i8*, i32, i64, i64)"),
    ("openlog", "drrt_openlog", "void (i8*, i32, i32, i64)"),
    ("syslog", "drrt_syslog", "void (i32, i8*, i64, ...)"),
    ("strcmp", "drrt_strcmp", "i32 (i8*, i8*, i64, i64)"),
    ("strncmp", "drrt_strncmp", "i32 (i8*, i8*, i64, i64, i64)"),
    ("strcasecmp", "drrt_strcasecmp", "i32 (i8*, i8*, i64, i64)"),
    ("strncasecmp", "drrt_strncasecmp", "i32 (i8*, i8*, i64, i64, i64)"),
    ("sprintf", "drrt_sprintf", "i32 (i8*, i8*, i64, i64, ...)"),
    ("snprintf", "drrt_snprintf", "i32 (i8*, i64, i8*, i64, i64, ...)"),
    ("printf", "drrt_printf", "i32 (i8*, i64, ...)"),
    ("fprintf", "drrt_fprintf", "i32 (%struct._IO_FILE*, i8*, i64, ...)"),
    ("puts", "drrt_puts", "i32 (i8*, i64)"),
    ("fputs", "drrt_fputs", "i32 (i8*, %struct._IO_FILE*, i64)"),
    ("perror", "drrt_perror", "void (i8*, i64)"),
    ("atoi", "drrt_atoi", "i32 (i8*, i64)"),
    ("chdir", "drrt_chdir", "i32 (i8*, i64)"),
    ("chroot", "drrt_chroot", "i32 (i8*, i64)"),
    ("strlen", "drrt_strlen", "i64 (i8*, i64)"),
    ("getcwd", "drrt_getcwd", "i8* (i8*, i64, i64, i64)"),
    ("strcat", "drrt_strcat", "i8* (i8*, i8*, i64, i64, i64)"),
    ("strncat", "drrt_strncat", "i8* (i8*, i8*, i64, i64, i64, i64)"),
    ("strcpy", "drrt_strcpy", "i8* (i8*, i8*, i64, i64, i64)"),
    ("strncpy", "drrt_strncpy", "i8* (i8*, i8*, i64, i64, i64, i64)"),
    ("strdup", "drrt_strdup", "i8* (i8*, i64, i64)"),
    ("__strdup", "drrt_strdup", "i8* (i8*, i64, i64)"),
    ("strstr", "drrt_strstr", "i8* (i8*, i8*, i64, i64, i64)"),
    ("strpbrk", "drrt_strpbrk", "i8* (i8*, i8*, i64, i64, i64)"),
    ("strspn", "drrt_strspn", "i64 (i8*, i8*, i64, i64)"),
    ("strcspn", "drrt_strcspn", "i64 (i8*, i8*, i64, i64)"),
    ("strtok", "drrt_strtok", "i8* (i8*, i8*, i64, i64, i64)"),
    ("gethostname", "drrt_gethostname", "i32 (i8*, i64, i64)"),
    ("read", "drrt_read", "i64 (i32, i8*, i64, i64)"),
    ("write", "drrt_write", "i64 (i32, i8*, i64, i64)"),
    ("recv", "drrt_recv", "i64 (i32, i8*, i64, i32, i64)"),
    ("readlink", "drrt_readlink", "i64 (i8*, i8*, i64, i64, i64)"),
    ("open", "drrt_open", "i32 (i8*, i32, i64, i64, ...)"),
    ("fcntl", "drrt_fcntl", "i32 (i32, i32, i64, ...)"),
    ("fileno", "fileno", "i32 (%struct._IO_FILE*)"),
    ("fopen", "drrt_fopen", "%struct._IO_FILE* (i8*, i8*, i64, i64)"),
    ("fdopen", "drrt_fdopen", "%struct._IO_FILE* (i32, i8*, i64)"),
    ("fclose", "fclose", "i32 (%struct._IO_FILE*)"),
    ("fflush", "fflush", "i32 (%struct._IO_FILE*)"),
    ("fgets", "drrt_fgets", "i8* (i8*, i32, %struct._IO_FILE*, i64, i64)"),
    ("fread", "drrt_fread", "i64 (i8*, i64, i64, %struct._IO_FILE*, i64)"),
    ("fwrite", "drrt_fwrite", "i64 (i8*, i64, i64, %struct._IO_FILE*, i64)"),
    ("memchr", "drrt_memchr", "i8* (i8*, i32, i64, i64, i64)"),
    ("memcmp", "drrt_memcmp", "i32 (i8*, i8*, i64, i64, i64)"),
    ("memmove", "drrt_memmove", "i8* (i8*, i8*, i64, i64, i64, i64)"),
    ("memset", "drrt_memset", "i8* (i8*, i32, i64, i64, i64)"),
    ("pipe", "drrt_pipe", "i32 (i32*, i64)"),
    ("waitpid", "drrt_waitpid", "i32 (i32, i32*, i32, i64)"),
    ("setenv", "drrt_setenv", "i32 (i8*, i8*, i32, i64, i64)"),
    ("unsetenv", "drrt_unsetenv", "i32 (i8*, i64)"),
    ("getenv", "drrt_getenv", "i8* (i8*, i64, i64)"),
    ("execve", "drrt_execve", "i32 (i8*, i8**, i8**, i64, i64, i64, i64, i64)"),
    ("calloc", "drrt_calloc", "i8* (i64, i64, i64)"),
    ("realloc", "drrt_realloc", "i8* (i8*, i64, i64, i64)"),
    ("posix_memalign", "drrt_posix_memalign", "i32 (i8**, i64, i64, i64, i64)"),
    ("time", "drrt_time", "i64 (i64*, i64)"),
    ("ctime", "drrt_ctime", "i8* (i64*, i64, i64)"),
    ("gmtime", "drrt_gmtime", "%struct.tm* (i64*, i64, i64, i64)"),
    ("localtime", "drrt_localtime", "%struct.tm* (i64*, i64, i64, i64)"),
    (
        "gmtime_r",
        "drrt_gmtime_r",
        "%struct.tm* (i64*, %struct.tm*, i64, i64, i64, i64, i64)",
    ),
    (
        "localtime_r",
        "drrt_localtime_r",
        "%struct.tm* (i64*, %struct.tm*, i64, i64, i64, i64, i64)",
    ),
    (
        "strftime",
        "drrt_strftime",
        "i64 (i8*, i64, i8*, %struct.tm*, i64, i64, i64, i64)",
    ),
    ("gettimeofday", "drrt_gettimeofday", "i32 (%struct.timeval*, %struct.timezone*, i64, i64)"),
    ("stat", "drrt_stat", "i32 (i8*, %struct.stat*, i64, i64)"),
    ("__xstat", "drrt__xstat", "i32 (i32, i8*, %struct.stat*, i64, i64)"),
    ("__lxstat", "drrt___lxstat", "i32 (i32, i8*, %struct.stat*, i64, i64)"),
    ("getrlimit", "drrt_getrlimit", "i32 (i32, %struct.rlimit*, i64)"),
    ("setrlimit", "drrt_setrlimit", "i32 (i32, %struct.rlimit*, i64)"),
    ("bind", "drrt_bind", "i32 (i32, %struct.sockaddr*, i32, i64)"),
    ("accept", "drrt_accept", "i32 (i32, %struct.sockaddr*, i32*, i64, i64)"),
    ("getsockname", "drrt_getsockname", "i32 (i32, %struct.sockaddr*, i32*, i64, i64)"),
    ("setsockopt", "drrt_setsockopt", "i32 (i32, i32, i32, i8*, i32, i64)"),
    ("getsockopt", "drrt_getsockopt", "i32 (i32, i32, i32, i8*, i32*, i64, i64)"),
    ("poll", "drrt_poll", "i32 (%struct.pollfd*, i64, i32, i64)"),
    ("writev", "drrt_writev", "i64 (i32, %struct.iovec*, i32, i64, i64)"),
    ("sigemptyset", "drrt_sigemptyset", "i32 (%struct.__sigset_t*, i64)"),
    ("sigaction", "drrt_sigaction", "i32 (i32, %struct.sigaction*, %struct.sigaction*, i64, i64)"),
    ("initgroups", "drrt_initgroups", "i32 (i8*, i32, i64)"),
    ("ttyname", "drrt_ttyname", "i8* (i32, i64)"),
    ("sscanf", "drrt_sscanf", "i32 (i8*, i8*, i64, i64, i64, ...)"),
    ("__isoc99_sscanf", "drrt_sscanf", "i32 (i8*, i8*, i64, i64, i64, ...)"),
    ("fscanf", "drrt_fscanf", "i32 (%struct._IO_FILE*, i8*, i64, i64, ...)"),
    ("__isoc99_fscanf", "drrt_fscanf", "i32 (%struct._IO_FILE*, i8*, i64, i64, ...)"),
    ("scanf", "drrt_scanf", "i32 (i8*, i64, i64, ...)"),
    ("sleep", "sleep", "i32 (i32)"),
    ("exit", "exit", "void (i32)"),
    ("rand", "rand", "i32 ()"),
];

const FORMAT_FUNCTIONS: &[&str] = &[
    "printf",
    "fprintf",
    "sprintf",
    "snprintf",
    "syslog",
    "sscanf",
    "__isoc99_sscanf",
    "fscanf",
    "__isoc99_fscanf",
    "scanf",
];

const MEMORY_MANAGEMENT_FUNCTIONS: &[&str] = &["malloc", "free", "cfree"];

const JMP_FUNCTIONS: &[&str] = &["setjmp", "_setjmp", "longjmp", "_longjmp"];

/// External functions which never see masked memory.
const HARMLESS_FUNCTIONS: &[&str] = &["__crosscheck", "__cxa_atexit"];

/// The vtables of the classes describing C++ runtime type information.
const RTTI_VTABLES: &[&str] = &[
    "_ZTVN10__cxxabiv123__fundamental_type_infoE",
    "_ZTVN10__cxxabiv117__array_type_infoE",
    "_ZTVN10__cxxabiv120__function_type_infoE",
    "_ZTVN10__cxxabiv116__enum_type_infoE",
    "_ZTVN10__cxxabiv117__class_type_infoE",
    "_ZTVN10__cxxabiv120__si_class_type_infoE",
    "_ZTVN10__cxxabiv121__vmi_class_type_infoE",
    "_ZTVN10__cxxabiv117__pbase_type_infoE",
    "_ZTVN10__cxxabiv119__pointer_type_infoE",
    "_ZTVN10__cxxabiv129__pointer_to_member_type_infoE",
];

/// A mask-aware replacement for a library function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WrapperDescriptor {
    name: String,
    wrapper: String,
    function_type: FunctionType,
}

impl WrapperDescriptor {
    /// The name of the wrapped function.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wrapper(&self) -> &str {
        &self.wrapper
    }

    pub fn function_type(&self) -> &FunctionType {
        &self.function_type
    }
}

/// The library functions the randomization pass knows how to handle.
#[derive(Clone, Debug)]
pub struct LibraryWrapperCatalog {
    wrappers: BTreeMap<String, WrapperDescriptor>,
    helpers: BTreeMap<String, FunctionType>,
}

impl LibraryWrapperCatalog {
    /// Parse the built-in wrapper signatures.
    pub fn new() -> Result<LibraryWrapperCatalog, Error> {
        let wrappers = WRAPPERS
            .iter()
            .map(|&(name, wrapper, signature)| {
                let descriptor = WrapperDescriptor {
                    name: name.to_string(),
                    wrapper: wrapper.to_string(),
                    function_type: FunctionType::parse(signature)?,
                };
                Ok((name.to_string(), descriptor))
            })
            .collect::<Result<BTreeMap<String, WrapperDescriptor>, Error>>()?;
        let helpers = RUNTIME_HELPERS
            .iter()
            .map(|&(name, signature)| Ok((name.to_string(), FunctionType::parse(signature)?)))
            .collect::<Result<BTreeMap<String, FunctionType>, Error>>()?;
        Ok(LibraryWrapperCatalog { wrappers, helpers })
    }

    /// The type of the runtime routine `name`.
    pub fn runtime_helper(&self, name: &str) -> Result<&FunctionType, Error> {
        self.helpers
            .get(name)
            .ok_or_else(|| Error::Custom(format!("No runtime routine named {}", name)))
    }

    pub fn wrapper(&self, name: &str) -> Option<&WrapperDescriptor> {
        self.wrappers.get(name)
    }

    pub fn has_wrapper(&self, name: &str) -> bool {
        self.wrappers.contains_key(name)
    }

    pub fn wrappers(&self) -> impl Iterator<Item = &WrapperDescriptor> {
        self.wrappers.values()
    }

    /// Format functions receive a mask after every variadic argument.
    pub fn is_format_function(&self, name: &str) -> bool {
        FORMAT_FUNCTIONS.contains(&name)
    }

    pub fn is_memory_management_function(&self, name: &str) -> bool {
        MEMORY_MANAGEMENT_FUNCTIONS.contains(&name)
    }

    pub fn is_jmp_function(&self, name: &str) -> bool {
        JMP_FUNCTIONS.contains(&name)
    }

    pub fn is_harmless_function(&self, name: &str) -> bool {
        HARMLESS_FUNCTIONS.contains(&name)
    }

    pub fn is_rtti_vtable(&self, name: &str) -> bool {
        RTTI_VTABLES.contains(&name)
    }

    /// Returns false for values whose memory is laid out by code the pass
    /// cannot see: stdio streams and opaque structs.
    pub fn type_can_be_encrypted(&self, ty: &Type, layout: &Layout) -> bool {
        if ty.pointee() == Some(&Type::structure(FILE_STRUCT)) {
            return false;
        }
        !(ty.is_struct() || ty.pointee().map(|p| p.is_struct()).unwrap_or(false))
            || !layout.is_opaque(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::StructBody;

    #[test]
    fn built_in_signatures_parse() {
        let catalog = LibraryWrapperCatalog::new().unwrap();
        let strlen = catalog.wrapper("strlen").unwrap();
        assert_eq!(strlen.wrapper(), "drrt_strlen");
        assert_eq!(strlen.function_type().to_string(), "i64 (i8*, i64)");
        assert!(catalog.wrapper("printf").unwrap().function_type().variadic());
        assert_eq!(catalog.wrapper("__not_main").unwrap().wrapper(), "drrt_main");
        assert!(!catalog.has_wrapper("system"));
        assert_eq!(catalog.runtime_helper(MEMMOVE).unwrap().num_params(), 6);
        assert!(catalog.runtime_helper("drrt_encrypt_globals").is_err());
    }

    #[test]
    fn streams_and_opaque_structs_are_unencryptable() {
        let catalog = LibraryWrapperCatalog::new().unwrap();
        let mut structs = BTreeMap::new();
        structs.insert(FILE_STRUCT.to_string(), StructBody::new(vec![Type::Int(32)]));
        structs.insert("struct.pair".to_string(), StructBody::new(vec![Type::Int(32)]));
        structs.insert("struct.hidden".to_string(), StructBody::opaque());
        let layout = Layout::new(Default::default(), structs);

        let file = Type::pointer(Type::structure(FILE_STRUCT));
        assert!(!catalog.type_can_be_encrypted(&file, &layout));
        let hidden = Type::pointer(Type::structure("struct.hidden"));
        assert!(!catalog.type_can_be_encrypted(&hidden, &layout));
        let pair = Type::pointer(Type::structure("struct.pair"));
        assert!(catalog.type_can_be_encrypted(&pair, &layout));
        assert!(catalog.type_can_be_encrypted(&Type::i8_pointer(), &layout));
    }
}
