//! Retention key derivation.
//!
//! Every retained object lives under exactly one cache key: `HOST-<host>` for
//! hosts and `SERVICE-<host>,<service>` for services. Memcached keys cannot
//! contain spaces, so each space is rewritten to the literal token `SPACE`.

use crate::types::ServiceId;
use std::fmt;

const HOST_TAG: &str = "HOST-";
const SERVICE_TAG: &str = "SERVICE-";
const SPACE_TOKEN: &str = "SPACE";

/// A retained object's identity, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RetentionKey<'a> {
    Host(&'a str),
    Service {
        host_name: &'a str,
        service_description: &'a str,
    },
}

impl<'a> RetentionKey<'a> {
    pub fn host(host_name: &'a str) -> Self {
        RetentionKey::Host(host_name)
    }

    pub fn service(id: &'a ServiceId) -> Self {
        RetentionKey::Service {
            host_name: &id.host_name,
            service_description: &id.service_description,
        }
    }

    /// Normalized key bytes, ready for the transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        normalize_key(&self.to_string())
    }
}

impl fmt::Display for RetentionKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionKey::Host(host_name) => write!(f, "{}{}", HOST_TAG, host_name),
            RetentionKey::Service {
                host_name,
                service_description,
            } => write!(f, "{}{},{}", SERVICE_TAG, host_name, service_description),
        }
    }
}

/// Replace spaces with the `SPACE` token and encode as UTF-8 bytes.
pub fn normalize_key(key: &str) -> Vec<u8> {
    key.replace(' ', SPACE_TOKEN).into_bytes()
}

/// Byte-level variant for identifiers that did not arrive as valid UTF-8.
///
/// Invalid sequences are dropped rather than rejected, then the result goes
/// through [`normalize_key`].
pub fn normalize_key_lossy(raw: &[u8]) -> Vec<u8> {
    let mut text = String::with_capacity(raw.len());
    for chunk in raw.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    normalize_key(&text)
}

/// Human-readable form of a normalized key for log lines.
pub fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_host_key() {
        assert_eq!(RetentionKey::host("web1").to_bytes(), b"HOST-web1".to_vec());
    }

    #[test]
    fn test_service_key_uses_comma_delimiter() {
        let id = ServiceId::new("web1", "HTTP");
        assert_eq!(
            RetentionKey::service(&id).to_bytes(),
            b"SERVICE-web1,HTTP".to_vec()
        );
    }

    #[test]
    fn test_spaces_become_token() {
        let id = ServiceId::new("db 1", "Disk Usage /var");
        assert_eq!(
            RetentionKey::service(&id).to_string(),
            "SERVICE-db 1,Disk Usage /var"
        );
        assert_eq!(
            RetentionKey::service(&id).to_bytes(),
            b"SERVICE-dbSPACE1,DiskSPACEUsageSPACE/var".to_vec()
        );
    }

    #[test]
    fn test_normalize_is_deterministic() {
        for s in ["", " ", "a b c", "HOST-été serveur", "  lead"] {
            assert_eq!(normalize_key(s), normalize_key(s));
            assert!(!normalize_key(s).contains(&b' '));
        }
    }

    #[test]
    fn test_non_ascii_is_kept_as_utf8() {
        assert_eq!(normalize_key("HOST-café"), "HOST-café".as_bytes().to_vec());
    }

    #[test]
    fn test_lossy_drops_invalid_bytes() {
        let raw = b"HOST-we\xffb 1";
        assert_eq!(normalize_key_lossy(raw), b"HOST-webSPACE1".to_vec());
    }

    #[test]
    fn test_distinct_hosts_give_distinct_keys() {
        let hosts = ["web1", "web2", "web 1", "web1 ", "WEB1"];
        let keys: HashSet<Vec<u8>> = hosts
            .iter()
            .map(|h| RetentionKey::host(h).to_bytes())
            .collect();
        assert_eq!(keys.len(), hosts.len());
    }

    #[test]
    fn test_service_keys_never_collide_with_host_keys() {
        let services = [
            ServiceId::new("web1", "HTTP"),
            ServiceId::new("web1", "HTTPS"),
            ServiceId::new("web2", "HTTP"),
            ServiceId::new("SERVICE-web1", "HTTP"),
        ];
        let mut keys: HashSet<Vec<u8>> = services
            .iter()
            .map(|s| RetentionKey::service(s).to_bytes())
            .collect();
        assert_eq!(keys.len(), services.len());

        for host in ["web1", "SERVICE-web1,HTTP", "web2"] {
            assert!(keys.insert(RetentionKey::host(host).to_bytes()));
        }
    }

    #[test]
    fn test_display_key() {
        assert_eq!(display_key(b"HOST-webSPACE1"), "HOST-webSPACE1");
    }
}
