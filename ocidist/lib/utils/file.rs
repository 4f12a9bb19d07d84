use std::io::{self, Read};

use oci_spec::image::DigestAlgorithm;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::{OcidistError, OcidistResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const HASH_BUFFER_SIZE: usize = 64 * 1024;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Gets the hex-encoded hash of everything `reader` yields.
pub fn get_reader_hash(
    reader: &mut impl Read,
    algorithm: &DigestAlgorithm,
) -> OcidistResult<String> {
    match algorithm {
        DigestAlgorithm::Sha256 => hash_with::<Sha256>(reader),
        DigestAlgorithm::Sha384 => hash_with::<Sha384>(reader),
        DigestAlgorithm::Sha512 => hash_with::<Sha512>(reader),
        _ => Err(OcidistError::UnsupportedDigestAlgorithm(
            algorithm.to_string(),
        )),
    }
}

fn hash_with<D: Digest>(reader: &mut impl Read) -> OcidistResult<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_hash_sha256_of_empty_input() -> anyhow::Result<()> {
        let hash = get_reader_hash(&mut io::empty(), &DigestAlgorithm::Sha256)?;
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        Ok(())
    }

    #[test]
    fn test_reader_hash_spans_buffer_refills() -> anyhow::Result<()> {
        let data = vec![7u8; HASH_BUFFER_SIZE * 2 + 3];
        let streamed = get_reader_hash(&mut data.as_slice(), &DigestAlgorithm::Sha512)?;
        assert_eq!(streamed, hex::encode(Sha512::digest(&data)));
        assert_eq!(streamed.len(), 128);
        Ok(())
    }
}
