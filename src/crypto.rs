/// 帧加密模块
///
/// ChaCha20-Poly1305 AEAD，每帧使用随机 nonce 并随帧传输，
/// 因此同一连接上新建的变换实例也能与对端互通
use crate::error::{RelayError, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305};
use ring::hkdf::{Salt, HKDF_SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use std::io;
use std::sync::Arc;

/// 对称密钥长度
pub const KEY_LEN: usize = 32;

/// Nonce 长度
pub const NONCE_LEN: usize = 12;

/// 认证标签长度
pub const TAG_LEN: usize = 16;

/// 每帧固定开销（nonce + tag）
pub const FRAME_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

const KDF_SALT: &[u8] = b"tunnel-relay frame salt v1";
const KDF_INFO: &[u8] = b"tunnel-relay frame key";

/// 会话加密器，克隆后共享同一把密钥
#[derive(Clone)]
pub struct SessionCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl SessionCipher {
    /// 从 32 字节密钥创建
    pub fn new(key: &[u8; KEY_LEN]) -> Result<Self> {
        let unbound = UnboundKey::new(&CHACHA20_POLY1305, key)
            .map_err(|_| RelayError::crypto_error("invalid key length"))?;
        Ok(Self::from_unbound(unbound))
    }

    /// 使用 HKDF-SHA256 从共享口令派生密钥
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(RelayError::config_error("crypt_key cannot be empty"));
        }
        let prk = Salt::new(HKDF_SHA256, KDF_SALT).extract(secret.as_bytes());
        let okm = prk
            .expand(&[KDF_INFO], &CHACHA20_POLY1305)
            .map_err(|_| RelayError::crypto_error("HKDF expand failed"))?;
        Ok(Self::from_unbound(UnboundKey::from(okm)))
    }

    fn from_unbound(unbound: UnboundKey) -> Self {
        Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        }
    }

    /// 加密一帧，输出 `nonce || ciphertext || tag`
    pub fn seal(&self, plaintext: &[u8]) -> io::Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| io::Error::other("failed to generate nonce"))?;

        let mut out = Vec::with_capacity(plaintext.len() + FRAME_OVERHEAD);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(plaintext);

        let tag = self
            .key
            .seal_in_place_separate_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::empty(),
                &mut out[NONCE_LEN..],
            )
            .map_err(|_| io::Error::other("seal failed"))?;
        out.extend_from_slice(tag.as_ref());
        Ok(out)
    }

    /// 解密一帧并校验认证标签
    pub fn open(&self, mut frame: Vec<u8>) -> io::Result<Vec<u8>> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(invalid_data("encrypted frame too short"));
        }

        let nonce = Nonce::try_assume_unique_for_key(&frame[..NONCE_LEN])
            .map_err(|_| invalid_data("invalid nonce"))?;
        let plain_len = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut frame[NONCE_LEN..])
            .map_err(|_| invalid_data("frame authentication failed"))?
            .len();

        frame.truncate(NONCE_LEN + plain_len);
        frame.drain(..NONCE_LEN);
        Ok(frame)
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionCipher { .. }")
    }
}

fn invalid_data(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let cipher = SessionCipher::new(&[0x42u8; KEY_LEN]).unwrap();

        let frame = cipher.seal(b"Hello, World!").unwrap();
        assert_eq!(frame.len(), 13 + FRAME_OVERHEAD);

        let plain = cipher.open(frame).unwrap();
        assert_eq!(plain, b"Hello, World!");
    }

    #[test]
    fn test_nonce_is_random() {
        let cipher = SessionCipher::from_secret("0123456789abcdef").unwrap();
        let a = cipher.seal(b"same").unwrap();
        let b = cipher.seal(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_derived_keys_interoperate() {
        let a = SessionCipher::from_secret("shared secret value").unwrap();
        let b = SessionCipher::from_secret("shared secret value").unwrap();
        let c = SessionCipher::from_secret("another secret").unwrap();

        let frame = a.seal(b"payload").unwrap();
        assert_eq!(b.open(frame.clone()).unwrap(), b"payload");
        assert_eq!(
            c.open(frame).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn test_tamper_detection() {
        let cipher = SessionCipher::new(&[7u8; KEY_LEN]).unwrap();
        let mut frame = cipher.seal(b"Hello").unwrap();
        frame[NONCE_LEN] ^= 0xFF;

        let err = cipher.open(frame).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_short_frame_rejected() {
        let cipher = SessionCipher::new(&[7u8; KEY_LEN]).unwrap();
        let err = cipher.open(vec![0u8; FRAME_OVERHEAD - 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(SessionCipher::from_secret("").unwrap_err().is_config_error());
    }
}
