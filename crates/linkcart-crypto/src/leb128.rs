use anyhow::{bail, Result};

pub fn encode_u64(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

pub fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        let shift = 7 * i as u32;
        if shift >= 64 {
            bail!("LEB128 value does not fit in 64 bits");
        }
        let chunk = (byte & 0x7f) as u64;
        if shift > 0 && chunk >> (64 - shift) != 0 {
            bail!("LEB128 value does not fit in 64 bits");
        }
        value |= chunk << shift;
        if byte & 0x80 == 0 {
            if i + 1 != bytes.len() {
                bail!("trailing bytes after LEB128 value");
            }
            return Ok(value);
        }
    }
    bail!("truncated LEB128 value")
}
