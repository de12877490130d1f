//! Fixed-offset configuration decoding.
//!
//! Each family stores its settings in a flat binary blob with fields at
//! known offsets. Every field read is bounds-checked against the blob
//! that was actually captured; a clipped blob fails at the first field
//! outside the window instead of producing a half-garbage record.

use serde::Serialize;

use super::ExtractError;
use crate::detection::FamilyId;

/// How a fixed-width string field is trimmed after the raw bytes are
/// read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrimMode {
    /// Stop at the first NUL byte.
    NulTerminated,
    /// Remove every NUL byte, keeping the bytes around them.
    StripNuls,
}

fn read_bytes(blob: &[u8], offset: usize, len: usize) -> Result<&[u8], ExtractError> {
    let end = offset.checked_add(len).ok_or(ExtractError::BlobUnavailable)?;
    blob.get(offset..end).ok_or(ExtractError::BlobUnavailable)
}

fn read_u32(blob: &[u8], offset: usize) -> Result<u32, ExtractError> {
    let bytes = read_bytes(blob, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_str(
    blob: &[u8],
    offset: usize,
    len: usize,
    trim: TrimMode,
) -> Result<String, ExtractError> {
    let raw = read_bytes(blob, offset, len)?;
    let trimmed: Vec<u8> = match trim {
        TrimMode::NulTerminated => raw
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .collect(),
        TrimMode::StripNuls => raw.iter().copied().filter(|&b| b != 0).collect(),
    };
    Ok(String::from_utf8_lossy(&trimmed).into_owned())
}

/// Connection transport selected by a RedLeaves configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectMode {
    Tcp,
    Http,
    Https,
    TcpAndHttp,
}

impl ConnectMode {
    /// Maps the on-wire integer to a transport. Values outside the
    /// known set are a decode fault, not a silent default.
    pub fn from_raw(raw: u32) -> Result<Self, ExtractError> {
        match raw {
            1 => Ok(ConnectMode::Tcp),
            2 => Ok(ConnectMode::Http),
            3 => Ok(ConnectMode::Https),
            4 => Ok(ConnectMode::TcpAndHttp),
            other => Err(ExtractError::ModeOutOfRange(other)),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            ConnectMode::Tcp => 1,
            ConnectMode::Http => 2,
            ConnectMode::Https => 3,
            ConnectMode::TcpAndHttp => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectMode::Tcp => "TCP",
            ConnectMode::Http => "HTTP",
            ConnectMode::Https => "HTTPS",
            ConnectMode::TcpAndHttp => "TCP and HTTP",
        }
    }
}

/// Decoded RedLeaves configuration (2100-byte blob).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedLeavesConfig {
    pub server1: String,
    pub server2: String,
    pub server3: String,
    pub port: u32,
    pub mode: ConnectMode,
    pub id: String,
    pub mutex: String,
    pub injection: String,
    pub rc4_key: String,
}

/// Decoded Himawari-group configuration (880-byte blob), shared by
/// Himawari, Lavender, Armadill and zark20rk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HimawariConfig {
    pub server1: String,
    pub server2: String,
    pub server3: String,
    pub server4: String,
    pub port: u32,
    pub unknown1: Vec<u8>,
    pub unknown2: Vec<u8>,
    pub unknown3: Vec<u8>,
    pub sleep1: u32,
    pub sleep2: u32,
    pub mode: u32,
    pub id: String,
    pub sleep3: u32,
    pub mutex: String,
    pub user_agent: String,
    pub key: String,
}

/// A decoded configuration, tagged by layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum ConfigRecord {
    RedLeaves(RedLeavesConfig),
    Himawari(HimawariConfig),
}

/// Decodes `blob` according to the layout the family uses.
pub fn decode(family: FamilyId, blob: &[u8]) -> Result<ConfigRecord, ExtractError> {
    match family {
        FamilyId::RedLeaves => decode_redleaves(blob).map(ConfigRecord::RedLeaves),
        FamilyId::Himawari
        | FamilyId::Lavender
        | FamilyId::Armadill
        | FamilyId::Zark20rk => decode_himawari(blob).map(ConfigRecord::Himawari),
    }
}

fn decode_redleaves(blob: &[u8]) -> Result<RedLeavesConfig, ExtractError> {
    Ok(RedLeavesConfig {
        server1: read_str(blob, 0x00, 64, TrimMode::NulTerminated)?,
        server2: read_str(blob, 0x40, 64, TrimMode::NulTerminated)?,
        server3: read_str(blob, 0x80, 64, TrimMode::NulTerminated)?,
        port: read_u32(blob, 0xC0)?,
        mode: ConnectMode::from_raw(read_u32(blob, 0x1D0)?)?,
        id: read_str(blob, 0x1E4, 64, TrimMode::NulTerminated)?,
        mutex: read_str(blob, 0x500, 550, TrimMode::StripNuls)?,
        injection: read_str(blob, 0x726, 104, TrimMode::StripNuls)?,
        rc4_key: read_str(blob, 0x82A, 10, TrimMode::NulTerminated)?,
    })
}

fn decode_himawari(blob: &[u8]) -> Result<HimawariConfig, ExtractError> {
    Ok(HimawariConfig {
        server1: read_str(blob, 0x04, 64, TrimMode::NulTerminated)?,
        server2: read_str(blob, 0x44, 64, TrimMode::NulTerminated)?,
        server3: read_str(blob, 0x84, 64, TrimMode::NulTerminated)?,
        server4: read_str(blob, 0xC4, 64, TrimMode::NulTerminated)?,
        port: read_u32(blob, 0x104)?,
        unknown1: read_bytes(blob, 0x10C, 64)?.to_vec(),
        unknown2: read_bytes(blob, 0x14C, 64)?.to_vec(),
        unknown3: read_bytes(blob, 0x18C, 64)?.to_vec(),
        sleep1: read_u32(blob, 0x1D0)?,
        sleep2: read_u32(blob, 0x1D4)?,
        mode: read_u32(blob, 0x1D8)?,
        id: read_str(blob, 0x1E0, 64, TrimMode::NulTerminated)?,
        sleep3: read_u32(blob, 0x220)?,
        mutex: read_str(blob, 0x224, 62, TrimMode::StripNuls)?,
        user_agent: read_str(blob, 0x262, 260, TrimMode::StripNuls)?,
        key: read_str(blob, 0x366, 10, TrimMode::NulTerminated)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDLEAVES_BLOB_LEN: usize = 2100;
    const HIMAWARI_BLOB_LEN: usize = 880;

    fn put(blob: &mut [u8], offset: usize, bytes: &[u8]) {
        blob[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn redleaves_blob() -> Vec<u8> {
        let mut blob = vec![0u8; REDLEAVES_BLOB_LEN];
        put(&mut blob, 0x00, b"1.2.3.4\x00garbage after the nul");
        put(&mut blob, 0x40, b"c2.example.net");
        put(&mut blob, 0xC0, &443u32.to_le_bytes());
        put(&mut blob, 0x1D0, &3u32.to_le_bytes());
        put(&mut blob, 0x1E4, b"victim-01");
        // Wide-string mutex: NULs interleaved with ASCII.
        put(&mut blob, 0x500, b"G\x00l\x00o\x00b\x00a\x00l\x00M\x00t\x00x\x00");
        put(&mut blob, 0x726, b"s\x00v\x00c\x00h\x00o\x00s\x00t\x00.exe");
        put(&mut blob, 0x82A, b"Lucky123\x00\x00");
        blob
    }

    fn himawari_blob() -> Vec<u8> {
        let mut blob = vec![0u8; HIMAWARI_BLOB_LEN];
        put(&mut blob, 0x04, b"10.0.0.1");
        put(&mut blob, 0x44, b"10.0.0.2");
        put(&mut blob, 0x104, &8080u32.to_le_bytes());
        put(&mut blob, 0x10C, &[0xDE, 0xAD, 0xBE, 0xEF]);
        put(&mut blob, 0x1D0, &30u32.to_le_bytes());
        put(&mut blob, 0x1D4, &60u32.to_le_bytes());
        put(&mut blob, 0x1D8, &7u32.to_le_bytes());
        put(&mut blob, 0x1E0, b"hw-target");
        put(&mut blob, 0x220, &5u32.to_le_bytes());
        put(&mut blob, 0x224, b"H\x00i\x00m\x00a\x00M\x00t\x00x\x00");
        put(&mut blob, 0x262, b"M\x00o\x00z\x00i\x00l\x00l\x00a\x00/5.0");
        put(&mut blob, 0x366, b"key4conf\x00\x00");
        blob
    }

    #[test]
    fn test_redleaves_decode() {
        let blob = redleaves_blob();
        let record = decode(FamilyId::RedLeaves, &blob).unwrap();
        let ConfigRecord::RedLeaves(config) = record else {
            panic!("wrong layout");
        };
        assert_eq!(config.server1, "1.2.3.4");
        assert_eq!(config.server2, "c2.example.net");
        assert_eq!(config.server3, "");
        assert_eq!(config.port, 443);
        assert_eq!(config.mode, ConnectMode::Https);
        assert_eq!(config.id, "victim-01");
        assert_eq!(config.mutex, "GlobalMtx");
        assert_eq!(config.injection, "svchost.exe");
        assert_eq!(config.rc4_key, "Lucky123");
    }

    #[test]
    fn test_himawari_group_share_layout() {
        let blob = himawari_blob();
        for family in [
            FamilyId::Himawari,
            FamilyId::Lavender,
            FamilyId::Armadill,
            FamilyId::Zark20rk,
        ] {
            let record = decode(family, &blob).unwrap();
            let ConfigRecord::Himawari(config) = record else {
                panic!("wrong layout for {family:?}");
            };
            assert_eq!(config.server1, "10.0.0.1");
            assert_eq!(config.server2, "10.0.0.2");
            assert_eq!(config.port, 8080);
            assert_eq!(&config.unknown1[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
            assert_eq!(config.sleep1, 30);
            assert_eq!(config.sleep2, 60);
            assert_eq!(config.mode, 7);
            assert_eq!(config.id, "hw-target");
            assert_eq!(config.sleep3, 5);
            assert_eq!(config.mutex, "HimaMtx");
            assert_eq!(config.user_agent, "Mozilla/5.0");
            assert_eq!(config.key, "key4conf");
        }
    }

    #[test]
    fn test_mode_out_of_range_is_a_fault() {
        let mut blob = redleaves_blob();
        put(&mut blob, 0x1D0, &5u32.to_le_bytes());
        let err = decode(FamilyId::RedLeaves, &blob).unwrap_err();
        assert_eq!(err, ExtractError::ModeOutOfRange(5));
        assert!(!err.is_skip());
    }

    #[test]
    fn test_himawari_mode_is_not_validated() {
        // The Himawari layout reports the raw integer; only RedLeaves
        // has a closed mode set.
        let mut blob = himawari_blob();
        put(&mut blob, 0x1D8, &99u32.to_le_bytes());
        let record = decode(FamilyId::Himawari, &blob).unwrap();
        let ConfigRecord::Himawari(config) = record else {
            panic!("wrong layout");
        };
        assert_eq!(config.mode, 99);
    }

    #[test]
    fn test_clipped_blob_fails_at_first_missing_field() {
        let blob = redleaves_blob();
        // Cut just before the mutex field.
        let err = decode(FamilyId::RedLeaves, &blob[..0x500]).unwrap_err();
        assert_eq!(err, ExtractError::BlobUnavailable);

        let err = decode(FamilyId::Himawari, &himawari_blob()[..0x100]).unwrap_err();
        assert_eq!(err, ExtractError::BlobUnavailable);
    }

    #[test]
    fn test_decode_is_pure() {
        let blob = redleaves_blob();
        let first = decode(FamilyId::RedLeaves, &blob).unwrap();
        let second = decode(FamilyId::RedLeaves, &blob).unwrap();
        assert_eq!(first, second);

        let blob = himawari_blob();
        let first = decode(FamilyId::Himawari, &blob).unwrap();
        let second = decode(FamilyId::Himawari, &blob).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_trim_modes_differ() {
        // A NUL-terminated field stops at the first NUL; a stripped
        // field keeps reading past it.
        let raw = b"a\x00b\x00c\x00";
        assert_eq!(
            read_str(raw, 0, raw.len(), TrimMode::NulTerminated).unwrap(),
            "a"
        );
        assert_eq!(
            read_str(raw, 0, raw.len(), TrimMode::StripNuls).unwrap(),
            "abc"
        );
    }
}
