//! Content hashes recorded for precompiled files.

use std::io::{self, Read};

use sha2::{Digest, Sha256};

use super::file_system::FileInfo;

const BUFFER_SIZE: usize = 8 * 1024;

/// Lowercase hex SHA-256 of everything `reader` yields.
pub fn hash_stream(reader: &mut dyn Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn hash_file(file: &dyn FileInfo) -> io::Result<String> {
    let mut stream = file.create_read_stream()?;
    hash_stream(&mut stream)
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
