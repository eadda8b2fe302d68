//! The runtime routines randomized programs link against, along with the
//! few library functions the executor provides itself.
//!
//! A byte at address `a` belonging to a class with mask `m` holds
//! `plain ^ mask_byte(m, a)`.

use crate::executor::State;
use crate::il;
use crate::Error;
use log::trace;

/// The byte of `mask` which applies to the byte at `address`.
pub fn mask_byte(mask: u64, address: u64) -> u8 {
    (mask >> ((address % 8) * 8)) as u8
}

/// XOR `length` bytes at `address` with `mask`, in place.
pub fn xor_mem(state: &mut State, address: u64, mask: u64, length: u64) -> Result<(), Error> {
    for offset in 0..length {
        let byte = state.memory().load_u8(address + offset)?;
        state
            .memory_mut()
            .store_u8(address + offset, byte ^ mask_byte(mask, address + offset));
    }
    Ok(())
}

/// Read a NUL-terminated string whose bytes are masked with `mask`.
pub fn load_masked_string(state: &State, address: u64, mask: u64) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    loop {
        let at = address + bytes.len() as u64;
        match state.memory().load_u8(at)? ^ mask_byte(mask, at) {
            0 => return Ok(bytes),
            byte => bytes.push(byte),
        }
    }
}

fn argument(name: &str, arguments: &[il::Constant], index: usize) -> Result<u64, Error> {
    arguments
        .get(index)
        .and_then(|argument| argument.value_u64())
        .ok_or_else(|| Error::CallArity(name.to_string(), index + 1, arguments.len()))
}

/// Returns true if the executor implements `name` itself.
pub fn is_runtime_function(name: &str) -> bool {
    matches!(
        name,
        "drrt_xor_mem"
            | "drrt_memset"
            | "drrt_memmove"
            | "drrt_main"
            | "drrt_strlen"
            | "drrt_puts"
            | "malloc"
            | "free"
            | "strlen"
            | "puts"
    )
}

/// Call the runtime routine `name`.
pub fn call_runtime(
    state: &mut State,
    name: &str,
    arguments: &[il::Constant],
) -> Result<Option<il::Constant>, Error> {
    trace!("runtime call {}({:?})", name, arguments);
    let arg = |index| argument(name, arguments, index);
    match name {
        "drrt_xor_mem" => {
            xor_mem(state, arg(0)?, arg(1)?, arg(2)?)?;
            Ok(None)
        }
        "drrt_memset" => {
            let (dst, value, length, mask) = (arg(0)?, arg(1)? as u8, arg(2)?, arg(3)?);
            for offset in 0..length {
                let at = dst + offset;
                state.memory_mut().store_u8(at, value ^ mask_byte(mask, at));
            }
            Ok(Some(il::const_(dst, il::POINTER_BITS)))
        }
        "drrt_memmove" => {
            let (dst, src, length) = (arg(0)?, arg(1)?, arg(2)?);
            let (dst_mask, src_mask) = (arg(3)?, arg(5)?);
            let plain = (0..length)
                .map(|offset| {
                    let at = src + offset;
                    Ok(state.memory().load_u8(at)? ^ mask_byte(src_mask, at))
                })
                .collect::<Result<Vec<u8>, Error>>()?;
            for (offset, byte) in plain.into_iter().enumerate() {
                let at = dst + offset as u64;
                state.memory_mut().store_u8(at, byte ^ mask_byte(dst_mask, at));
            }
            Ok(Some(il::const_(dst, il::POINTER_BITS)))
        }
        "drrt_main" => {
            let (argc, argv, argv_mask, string_mask) = (arg(0)?, arg(1)?, arg(2)?, arg(3)?);
            for index in 0..argc {
                let string = state.memory().load_u64(argv + index * 8)?;
                let length = state.memory().load_c_string(string)?.len() as u64;
                xor_mem(state, string, string_mask, length + 1)?;
            }
            xor_mem(state, argv, argv_mask, (argc + 1) * 8)?;
            Ok(Some(il::const_(0, 32)))
        }
        "drrt_strlen" => {
            let length = load_masked_string(state, arg(0)?, arg(1)?)?.len();
            Ok(Some(il::const_(length as u64, 64)))
        }
        "drrt_puts" => {
            let bytes = load_masked_string(state, arg(0)?, arg(1)?)?;
            state.push_output(String::from_utf8_lossy(&bytes).into_owned());
            Ok(Some(il::const_(0, 32)))
        }
        "strlen" => {
            let length = state.memory().load_c_string(arg(0)?)?.len();
            Ok(Some(il::const_(length as u64, 64)))
        }
        "puts" => {
            let bytes = state.memory().load_c_string(arg(0)?)?;
            state.push_output(String::from_utf8_lossy(&bytes).into_owned());
            Ok(Some(il::const_(0, 32)))
        }
        "malloc" => {
            let address = state.memory_mut().allocate(arg(0)?, 16);
            Ok(Some(il::const_(address, il::POINTER_BITS)))
        }
        "free" => Ok(None),
        _ => Err(Error::ExecutorUnhandledCall(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Memory;
    use std::collections::BTreeMap;

    fn state() -> State {
        State::new(Memory::new(), BTreeMap::new(), il::Layout::default())
    }

    #[test]
    fn mask_bytes_follow_address() {
        let mask = 0x8877_6655_4433_2211;
        assert_eq!(mask_byte(mask, 0), 0x11);
        assert_eq!(mask_byte(mask, 3), 0x44);
        assert_eq!(mask_byte(mask, 11), 0x44);
    }

    #[test]
    fn memmove_reencrypts() {
        let mut state = state();
        let src = state.memory_mut().allocate(4, 8);
        let dst = state.memory_mut().allocate(4, 8) + 1;
        state.memory_mut().store_bytes(src, b"abc\0");
        xor_mem(&mut state, src, 0x0101_0101_0101_0101, 4).unwrap();

        let args = vec![
            il::const_(dst, 64),
            il::const_(src, 64),
            il::const_(4, 64),
            il::const_(0xa5a5_a5a5_a5a5_a5a5, 64),
            il::const_(0xa5a5_a5a5_a5a5_a5a5, 64),
            il::const_(0x0101_0101_0101_0101, 64),
        ];
        call_runtime(&mut state, "drrt_memmove", &args).unwrap();
        assert_eq!(
            load_masked_string(&state, dst, 0xa5a5_a5a5_a5a5_a5a5).unwrap(),
            b"abc".to_vec()
        );
    }

    #[test]
    fn missing_arguments_are_errors() {
        let mut state = state();
        assert!(call_runtime(&mut state, "drrt_xor_mem", &[il::const_(0, 64)]).is_err());
        assert!(call_runtime(&mut state, "system", &[]).is_err());
    }
}
