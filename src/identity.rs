//! Instance identity: `<hostname>:<uuid>`, generated once per process when joining a group.

use std::ffi::OsString;
use std::fmt::{Display, Formatter};

use derive_more::From;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use uuid::Uuid;

use crate::error::{GroupError, Result};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generates a new id from the OS random source and the local host name.
    pub fn generate() -> Result<Self> {
        Self::generate_with(&mut OsRng, hostname::get)
    }

    pub fn generate_with<R, H>(rng: &mut R, hostname: H) -> Result<Self>
    where
        R: RngCore + CryptoRng,
        H: FnOnce() -> std::io::Result<OsString>,
    {
        let uuid = generate_uuid(rng)?;
        let hostname = hostname()
            .map_err(GroupError::identity)?
            .into_string()
            .map_err(|host| GroupError::identity(format!("invalid host name {:?}", host)))?;
        if hostname.is_empty() {
            return Err(GroupError::identity("empty host name"));
        }

        Ok(InstanceId(format!("{}:{}", hostname, uuid.hyphenated())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hostname(&self) -> Option<&str> {
        self.0.rsplit_once(':').map(|(host, _)| host)
    }

    /// The embedded UUID, if this id was produced by [`InstanceId::generate`].
    pub fn uuid(&self) -> Option<Uuid> {
        self.0
            .rsplit_once(':')
            .and_then(|(_, uuid)| Uuid::parse_str(uuid).ok())
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        InstanceId(id.to_string())
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Draws 16 random bytes and stamps them as an RFC 4122 version 4 UUID.
pub fn generate_uuid<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Uuid> {
    let mut bytes = [0u8; 16];
    rng.try_fill_bytes(&mut bytes)
        .map_err(GroupError::identity)?;
    // variant 10xx xxxx
    bytes[8] = (bytes[8] & !0xc0) | 0x80;
    // version 0100 xxxx
    bytes[6] = (bytes[6] & !0xf0) | 0x40;
    Ok(Uuid::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    struct BrokenRng;

    impl CryptoRng for BrokenRng {}

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            unreachable!()
        }

        fn next_u64(&mut self) -> u64 {
            unreachable!()
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {
            unreachable!()
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "entropy exhausted",
            )))
        }
    }

    fn localhost() -> std::io::Result<OsString> {
        Ok(OsString::from("worker-1"))
    }

    #[test]
    fn format() {
        let id = InstanceId::generate_with(&mut StdRng::seed_from_u64(7), localhost).unwrap();
        let (host, uuid) = id.as_str().split_once(':').unwrap();
        assert_eq!("worker-1", host);
        assert_eq!(36, uuid.len());
        let groups: Vec<usize> = uuid.split('-').map(str::len).collect();
        assert_eq!(vec![8, 4, 4, 4, 12], groups);
        assert!(uuid
            .chars()
            .all(|c| c == '-' || c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(Some("worker-1"), id.hostname());
    }

    #[test]
    fn version_and_variant() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let uuid = generate_uuid(&mut rng).unwrap();
            let bytes = uuid.as_bytes();
            assert_eq!(0x40, bytes[6] & 0xf0);
            assert_eq!(0x80, bytes[8] & 0xc0);
            assert_eq!(Some(uuid::Version::Random), uuid.get_version());
            assert_eq!(uuid::Variant::RFC4122, uuid.get_variant());
        }
    }

    #[test]
    fn no_collisions() {
        let ids: HashSet<InstanceId> = (0..10_000)
            .map(|_| InstanceId::generate_with(&mut OsRng, localhost).unwrap())
            .collect();
        assert_eq!(10_000, ids.len());
    }

    #[test]
    fn uuid_round_trip() {
        let id = InstanceId::generate_with(&mut OsRng, localhost).unwrap();
        let uuid = id.uuid().unwrap();
        assert_eq!(id.as_str(), format!("worker-1:{}", uuid));
        assert_eq!(None, InstanceId::from("plain").uuid());
    }

    #[test]
    fn random_source_failure() {
        let res = InstanceId::generate_with(&mut BrokenRng, localhost);
        match res {
            Err(GroupError::IdentityGeneration { error_msg }) => {
                assert!(error_msg.contains("entropy exhausted"))
            }
            res => panic!("unexpected {:?}", res),
        }
    }

    #[test]
    fn hostname_failure() {
        let res = InstanceId::generate_with(&mut OsRng, || {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no host"))
        });
        assert!(matches!(res, Err(GroupError::IdentityGeneration { .. })));

        let res = InstanceId::generate_with(&mut OsRng, || Ok(OsString::new()));
        assert!(matches!(res, Err(GroupError::IdentityGeneration { .. })));
    }

    #[test]
    fn system() {
        let id = InstanceId::generate().unwrap();
        assert!(id.uuid().is_some());
    }
}
