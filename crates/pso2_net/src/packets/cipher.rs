use binrw::{BinRead, BinWrite};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use tracing::debug;

use crate::cipher::{rc4_key, SECRET_SIZE};
use crate::error::{Error, Result};

use super::{Payload, TYPE_CIPHER};

/// Size of the encrypted secret
pub const KEY_DATA_SIZE: usize = 0x80;

/// Opening packet of a session, carrying the RSA encrypted secret the RC4 key comes from
///
/// The ciphertext is stored with its bytes reversed.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct CipherPacket {
    pub key_data: [u8; KEY_DATA_SIZE],
    pub padding: [u8; 0x84],
}

impl Payload for CipherPacket {
    const PACKET_TYPE: u32 = TYPE_CIPHER;
}

impl CipherPacket {
    /// Encrypt `secret` for the holder of `key`.
    pub fn new(secret: &[u8], key: &RsaPublicKey) -> Result<Self> {
        let mut packet = CipherPacket {
            key_data: [0; KEY_DATA_SIZE],
            padding: [0; 0x84],
        };
        packet.set_secret(secret, key)?;
        Ok(packet)
    }

    /// Decrypt the secret with the receiving side's private key.
    pub fn secret(&self, key: &RsaPrivateKey) -> Result<Vec<u8>> {
        let mut ciphertext = self.key_data;
        ciphertext.reverse();
        Ok(key.decrypt(Pkcs1v15Encrypt, &ciphertext)?)
    }

    /// The RC4 session key derived from the secret
    pub fn rc4_key(&self, key: &RsaPrivateKey) -> Result<Vec<u8>> {
        Ok(rc4_key(&self.secret(key)?)?.to_vec())
    }

    /// Replace the ciphertext with `secret` encrypted for `key`.
    pub fn set_secret(&mut self, secret: &[u8], key: &RsaPublicKey) -> Result<()> {
        if secret.len() != SECRET_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: SECRET_SIZE,
                found: secret.len(),
            });
        }

        let mut ciphertext = key.encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, secret)?;
        if ciphertext.len() != KEY_DATA_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: KEY_DATA_SIZE,
                found: ciphertext.len(),
            });
        }
        debug!("re-encrypted session secret");

        ciphertext.reverse();
        self.key_data.copy_from_slice(&ciphertext);
        Ok(())
    }
}
