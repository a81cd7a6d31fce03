//! File hashing shared by both ends of the relay.

use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

use sha2::{Digest, Sha512};

/// SHA-512 digest of a file's contents as lowercase hex.
///
/// Reads in fixed-size chunks so large files never land in memory
/// whole.
///
/// # Errors
///
/// Propagates open/read failures.
pub fn sha512_hex_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();

        // SHA-512("abc"), FIPS 180-2 test vector.
        assert_eq!(
            sha512_hex_file(&path).unwrap(),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn empty_file_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        assert_eq!(
            sha512_hex_file(&path).unwrap(),
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce\
             47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(sha512_hex_file(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn two_passes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, vec![0x5au8; 200_000]).unwrap();

        assert_eq!(
            sha512_hex_file(&path).unwrap(),
            sha512_hex_file(&path).unwrap()
        );
    }
}
