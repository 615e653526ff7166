//! String-session encoders.
//!
//! Each backend flavour packs the same authorized-session material into the
//! byte layout its ecosystem expects:
//!
//! * Telethon v1: `'1' + urlsafe_b64(dc_id:u8 | ipv4:4 | port:u16be | auth_key:256)`
//! * Pyrogram v3: `urlsafe_b64_nopad(dc_id:u8 | api_id:u32be | test:u8 | auth_key:256 | user_id:u64be | bot:u8)`
//!
//! Pure byte work over a [`SessionParts`] snapshot so the encoders can be
//! tested without a network.

use base64::{
    Engine,
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};

use crate::BackendError;

/// Everything needed to render an authorized session as a string.
pub struct SessionParts {
    /// Data center the authorization key belongs to.
    pub dc_id: i32,
    /// IPv4 address of that data center, when recorded.
    pub ipv4: Option<[u8; 4]>,
    /// Server port.
    pub port: u16,
    /// The 256-byte MTProto authorization key.
    pub auth_key: [u8; 256],
    /// Signed-in account id.
    pub user_id: i64,
    /// API ID the session was created with.
    pub api_id: i32,
}

impl std::fmt::Debug for SessionParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionParts")
            .field("dc_id", &self.dc_id)
            .field("auth_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

const TELETHON_VERSION: char = '1';

/// Render a Telethon v1 string session.
pub fn encode_telethon(parts: &SessionParts) -> Result<String, BackendError> {
    let ipv4 = parts
        .ipv4
        .ok_or_else(|| BackendError::unexpected("no IPv4 address recorded for the data center"))?;
    let dc_id = u8::try_from(parts.dc_id)
        .map_err(|_| BackendError::unexpected("data center id out of range"))?;

    let mut packed = Vec::with_capacity(1 + 4 + 2 + 256);
    packed.push(dc_id);
    packed.extend_from_slice(&ipv4);
    packed.extend_from_slice(&parts.port.to_be_bytes());
    packed.extend_from_slice(&parts.auth_key);

    Ok(format!("{TELETHON_VERSION}{}", URL_SAFE.encode(packed)))
}

/// Render a Pyrogram v3 string session.
pub fn encode_pyrogram(parts: &SessionParts) -> Result<String, BackendError> {
    let dc_id = u8::try_from(parts.dc_id)
        .map_err(|_| BackendError::unexpected("data center id out of range"))?;
    let user_id = u64::try_from(parts.user_id)
        .map_err(|_| BackendError::unexpected("negative user id"))?;

    let mut packed = Vec::with_capacity(1 + 4 + 1 + 256 + 8 + 1);
    packed.push(dc_id);
    packed.extend_from_slice(&(parts.api_id as u32).to_be_bytes());
    packed.push(0); // production, not test mode
    packed.extend_from_slice(&parts.auth_key);
    packed.extend_from_slice(&user_id.to_be_bytes());
    packed.push(0); // user account, not a bot

    Ok(URL_SAFE_NO_PAD.encode(packed))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionParts {
        let mut auth_key = [0u8; 256];
        for (i, byte) in auth_key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        SessionParts {
            dc_id: 2,
            ipv4: Some([149, 154, 167, 50]),
            port: 443,
            auth_key,
            user_id: 777000,
            api_id: 123456,
        }
    }

    #[test]
    fn telethon_layout() {
        let s = encode_telethon(&sample()).unwrap();
        assert!(s.starts_with('1'));

        let packed = URL_SAFE.decode(&s[1..]).unwrap();
        assert_eq!(packed.len(), 263);
        assert_eq!(packed[0], 2); // dc id
        assert_eq!(&packed[1..5], &[149, 154, 167, 50]); // ip
        assert_eq!(u16::from_be_bytes([packed[5], packed[6]]), 443); // port
        assert_eq!(&packed[7..], &sample().auth_key[..]); // key
    }

    #[test]
    fn telethon_requires_ipv4() {
        let parts = SessionParts {
            ipv4: None,
            ..sample()
        };
        assert!(matches!(
            encode_telethon(&parts),
            Err(BackendError::Unexpected(_))
        ));
    }

    #[test]
    fn pyrogram_layout() {
        let s = encode_pyrogram(&sample()).unwrap();
        assert!(!s.contains('='), "pyrogram strings are unpadded");

        let packed = URL_SAFE_NO_PAD.decode(&s).unwrap();
        assert_eq!(packed.len(), 271);
        assert_eq!(packed[0], 2); // dc id
        let api_id = u32::from_be_bytes([packed[1], packed[2], packed[3], packed[4]]);
        assert_eq!(api_id, 123456);
        assert_eq!(packed[5], 0); // test mode off
        assert_eq!(&packed[6..262], &sample().auth_key[..]);
        let user_id = u64::from_be_bytes(packed[262..270].try_into().unwrap());
        assert_eq!(user_id, 777000);
        assert_eq!(packed[270], 0); // not a bot
    }

    #[test]
    fn oversized_dc_rejected() {
        let parts = SessionParts {
            dc_id: 300,
            ..sample()
        };
        assert!(encode_telethon(&parts).is_err());
        assert!(encode_pyrogram(&parts).is_err());
    }

    #[test]
    fn parts_debug_hides_key() {
        let rendered = format!("{:?}", sample());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("149"));
    }
}
