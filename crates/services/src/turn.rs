//! Time-limited TURN credentials, per the mechanism shared with the SFU's
//! embedded TURN deployment: `username = "<expiry>:meetuser"`, `credential =
//! base64(HMAC-SHA1(username, secret))`.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use meetsfu_config::TurnSettings;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone, serde::Serialize)]
pub struct TurnCredentials {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

pub fn generate_credentials(settings: &TurnSettings, now_unix: i64) -> TurnCredentials {
    let expiry = now_unix + settings.credential_ttl_secs as i64;
    let username = format!("{expiry}:meetuser");

    let mut mac =
        HmacSha1::new_from_slice(settings.secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(username.as_bytes());
    let credential = STANDARD.encode(mac.finalize().into_bytes());

    TurnCredentials {
        urls: vec![settings.server_url.clone(), "stun:stun.l.google.com:19302".to_string()],
        username,
        credential,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TurnSettings {
        TurnSettings {
            secret: "turn-secret".into(),
            server_url: "turn:turn.example.com:3478".into(),
            credential_ttl_secs: 86400,
        }
    }

    #[test]
    fn username_carries_expiry_and_fixed_suffix() {
        let creds = generate_credentials(&settings(), 1_000_000);
        assert_eq!(creds.username, "1086400:meetuser");
    }

    #[test]
    fn credential_is_deterministic_for_same_inputs() {
        let a = generate_credentials(&settings(), 1_000_000);
        let b = generate_credentials(&settings(), 1_000_000);
        assert_eq!(a.credential, b.credential);
    }

    #[test]
    fn different_secrets_produce_different_credentials() {
        let mut other = settings();
        other.secret = "different-secret".into();
        let a = generate_credentials(&settings(), 1_000_000);
        let b = generate_credentials(&other, 1_000_000);
        assert_ne!(a.credential, b.credential);
    }
}
