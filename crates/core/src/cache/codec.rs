//! Binary cache codec
//!
//! All integers are big-endian. Strings use a `u16` byte length followed by
//! UTF-8 bytes; headers that may exceed that limit use the long-string form
//! (`bool is_long`, then either a short string or an `i32` length and bytes).

use crate::attributes::{
    ActivationType, AppForceRestart, FileSignature, ImmutableAttributes, ProcessType, Visibility,
};
use crate::errors::CacheError;
use crate::manifest::details::CachedHeader;
use crate::version::Version;
use bytes::{Buf, BufMut, BytesMut};
use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

/// Cache format without platform state
pub const CACHE_VERSION: i32 = 3;
/// Cache format carrying configured platforms and the platform env var
pub const CACHE_VERSION_PLATFORMS: i32 = 4;

const SHORT_STRING_MAX: usize = u16::MAX as usize;

pub fn cache_version(platform_support: bool) -> i32 {
    if platform_support {
        CACHE_VERSION_PLATFORMS
    } else {
        CACHE_VERSION
    }
}

/// One cached feature: its attributes and the raw headers its flags announce
#[derive(Debug, Clone)]
pub struct CachedFeature {
    pub attributes: ImmutableAttributes,
    pub raw_headers: [Option<String>; 4],
}

/// A manifest file that failed to load, with the signature it had then
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadFileEntry {
    pub path: PathBuf,
    pub signature: FileSignature,
}

/// Everything persisted in one cache file
#[derive(Debug, Clone, Default)]
pub struct CacheContents {
    pub features: Vec<CachedFeature>,
    pub resolved: Vec<String>,
    pub configured: Vec<String>,
    pub configuration_error: bool,
    pub bad_files: Vec<BadFileEntry>,
    pub platforms: Vec<String>,
    pub platform_env_var: Option<String>,
}

pub fn encode(contents: &CacheContents, platform_support: bool) -> Result<Vec<u8>, CacheError> {
    let version = cache_version(platform_support);
    let mut out = BytesMut::with_capacity(4096);

    out.put_i32(version);
    put_len(&mut out, contents.features.len());
    for feature in &contents.features {
        put_feature(&mut out, feature)?;
    }

    put_string_list(&mut out, &contents.resolved)?;
    put_string_list(&mut out, &contents.configured)?;
    put_bool(&mut out, contents.configuration_error);

    put_len(&mut out, contents.bad_files.len());
    for bad in &contents.bad_files {
        put_utf(&mut out, &bad.path.to_string_lossy())?;
        out.put_i64(bad.signature.last_modified);
        out.put_i64(bad.signature.length);
    }

    if version == CACHE_VERSION_PLATFORMS {
        put_string_list(&mut out, &contents.platforms)?;
        match &contents.platform_env_var {
            Some(value) => {
                put_bool(&mut out, true);
                put_utf(&mut out, value)?;
            }
            None => put_bool(&mut out, false),
        }
    }

    Ok(out.to_vec())
}

pub fn decode(mut buf: &[u8], platform_support: bool) -> Result<CacheContents, CacheError> {
    let expected = cache_version(platform_support);
    let found = get_i32(&mut buf)?;
    if found != expected {
        return Err(CacheError::VersionMismatch { expected, found });
    }

    let mut contents = CacheContents::default();
    let count = get_len(&mut buf)?;
    for _ in 0..count {
        contents.features.push(get_feature(&mut buf)?);
    }

    contents.resolved = get_string_list(&mut buf)?;
    contents.configured = get_string_list(&mut buf)?;
    contents.configuration_error = get_bool(&mut buf)?;

    let bad_count = get_len(&mut buf)?;
    for _ in 0..bad_count {
        let path = PathBuf::from(get_utf(&mut buf)?);
        let last_modified = get_i64(&mut buf)?;
        let length = get_i64(&mut buf)?;
        contents.bad_files.push(BadFileEntry {
            path,
            signature: FileSignature::new(last_modified, length),
        });
    }

    if found == CACHE_VERSION_PLATFORMS {
        contents.platforms = get_string_list(&mut buf)?;
        if get_bool(&mut buf)? {
            contents.platform_env_var = Some(get_utf(&mut buf)?);
        }
    }

    Ok(contents)
}

fn put_feature(out: &mut BytesMut, feature: &CachedFeature) -> Result<(), CacheError> {
    let a = &feature.attributes;
    put_utf(out, &a.bundle_repository_type)?;
    put_utf(out, &a.symbolic_name)?;
    let file = a
        .feature_file
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    put_utf(out, &file)?;
    out.put_i64(a.signature.last_modified);
    out.put_i64(a.signature.length);
    put_utf(out, a.short_name.as_deref().unwrap_or(""))?;
    out.put_i32(a.feature_version);
    put_utf(out, a.visibility.as_str())?;
    put_utf(out, a.app_restart.as_str())?;
    out.put_i32(a.version.major);
    out.put_i32(a.version.minor);
    out.put_i32(a.version.micro);
    put_utf(out, &a.version.qualifier)?;

    let flags = header_flags(a);
    for flag in flags {
        put_bool(out, flag);
    }
    put_bool(out, a.is_singleton);
    put_bool(out, a.disable_on_conflict);

    put_len(out, a.process_types.len());
    for pt in &a.process_types {
        put_utf(out, pt.as_str())?;
    }
    put_utf(out, a.activation_type.as_str())?;
    put_string_list(out, &a.alternate_names)?;
    put_string_list(out, &a.platforms)?;

    for (flag, value) in flags.iter().zip(&feature.raw_headers) {
        if *flag {
            put_long_utf(out, value.as_deref().unwrap_or(""))?;
        }
    }
    Ok(())
}

fn get_feature(buf: &mut &[u8]) -> Result<CachedFeature, CacheError> {
    let repo_type = get_utf(buf)?;
    let symbolic_name = get_utf(buf)?;
    let file = get_utf(buf)?;
    let last_modified = get_i64(buf)?;
    let length = get_i64(buf)?;
    let short_name = Some(get_utf(buf)?).filter(|s| !s.is_empty());
    let feature_version = get_i32(buf)?;
    let visibility = Visibility::from_cache(&get_utf(buf)?)?;
    let app_restart = AppForceRestart::from_cache(&get_utf(buf)?)?;
    let major = get_i32(buf)?;
    let minor = get_i32(buf)?;
    let micro = get_i32(buf)?;
    let qualifier = get_utf(buf)?;

    let mut flags = [false; 4];
    for flag in flags.iter_mut() {
        *flag = get_bool(buf)?;
    }
    let is_singleton = get_bool(buf)?;
    let disable_on_conflict = get_bool(buf)?;

    let mut process_types = BTreeSet::new();
    for _ in 0..get_len(buf)? {
        let raw = get_utf(buf)?;
        let pt = ProcessType::parse(&raw).ok_or(CacheError::InvalidEnum {
            kind: "process type",
            value: raw,
        })?;
        process_types.insert(pt);
    }
    let activation_type = ActivationType::from_cache(&get_utf(buf)?)?;
    let alternate_names = get_string_list(buf)?;
    let platforms = get_string_list(buf)?;

    let mut raw_headers: [Option<String>; 4] = Default::default();
    for (flag, slot) in flags.iter().zip(raw_headers.iter_mut()) {
        if *flag {
            *slot = Some(get_long_utf(buf)?);
        }
    }

    let feature_name =
        ImmutableAttributes::build_feature_name(&repo_type, &symbolic_name, short_name.as_deref());
    let attributes = ImmutableAttributes {
        bundle_repository_type: repo_type,
        symbolic_name,
        short_name,
        feature_name,
        feature_version,
        visibility,
        app_restart,
        version: Version::new(major, minor, micro, qualifier),
        feature_file: Some(file).filter(|f| !f.is_empty()).map(PathBuf::from),
        signature: FileSignature::new(last_modified, length),
        process_types,
        is_auto_feature: flags[0],
        has_api_services: flags[1],
        has_api_packages: flags[2],
        has_spi_packages: flags[3],
        is_singleton,
        disable_on_conflict,
        activation_type,
        alternate_names,
        platforms,
    };
    Ok(CachedFeature {
        attributes,
        raw_headers,
    })
}

/// Flags in [`CachedHeader::ALL`] order
fn header_flags(a: &ImmutableAttributes) -> [bool; 4] {
    CachedHeader::ALL.map(|header| match header {
        CachedHeader::ProvisionCapability => a.is_auto_feature,
        CachedHeader::ApiService => a.has_api_services,
        CachedHeader::ApiPackage => a.has_api_packages,
        CachedHeader::SpiPackage => a.has_spi_packages,
    })
}

fn truncated() -> CacheError {
    CacheError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "cache file truncated",
    ))
}

fn ensure(buf: &&[u8], needed: usize) -> Result<(), CacheError> {
    if buf.remaining() < needed {
        Err(truncated())
    } else {
        Ok(())
    }
}

fn put_bool(out: &mut BytesMut, value: bool) {
    out.put_u8(u8::from(value));
}

fn put_len(out: &mut BytesMut, len: usize) {
    out.put_i32(len as i32);
}

fn put_utf(out: &mut BytesMut, value: &str) -> Result<(), CacheError> {
    let bytes = value.as_bytes();
    if bytes.len() > SHORT_STRING_MAX {
        return Err(CacheError::StringTooLong { len: bytes.len() });
    }
    out.put_u16(bytes.len() as u16);
    out.put_slice(bytes);
    Ok(())
}

fn put_long_utf(out: &mut BytesMut, value: &str) -> Result<(), CacheError> {
    let bytes = value.as_bytes();
    if bytes.len() > SHORT_STRING_MAX {
        put_bool(out, true);
        out.put_i32(bytes.len() as i32);
        out.put_slice(bytes);
        Ok(())
    } else {
        put_bool(out, false);
        put_utf(out, value)
    }
}

fn put_string_list(out: &mut BytesMut, values: &[String]) -> Result<(), CacheError> {
    put_len(out, values.len());
    for value in values {
        put_utf(out, value)?;
    }
    Ok(())
}

fn get_bool(buf: &mut &[u8]) -> Result<bool, CacheError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8() != 0)
}

fn get_i32(buf: &mut &[u8]) -> Result<i32, CacheError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32())
}

fn get_i64(buf: &mut &[u8]) -> Result<i64, CacheError> {
    ensure(buf, 8)?;
    Ok(buf.get_i64())
}

/// Element count; negative counts mean a corrupt file
fn get_len(buf: &mut &[u8]) -> Result<usize, CacheError> {
    let len = get_i32(buf)?;
    usize::try_from(len).map_err(|_| truncated())
}

fn get_bytes(buf: &mut &[u8], len: usize) -> Result<String, CacheError> {
    ensure(buf, len)?;
    let value = String::from_utf8(buf[..len].to_vec())
        .map_err(|e| CacheError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    buf.advance(len);
    Ok(value)
}

fn get_utf(buf: &mut &[u8]) -> Result<String, CacheError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    get_bytes(buf, len)
}

fn get_long_utf(buf: &mut &[u8]) -> Result<String, CacheError> {
    if get_bool(buf)? {
        let len = get_len(buf)?;
        get_bytes(buf, len)
    } else {
        get_utf(buf)
    }
}

fn get_string_list(buf: &mut &[u8]) -> Result<Vec<String>, CacheError> {
    let count = get_len(buf)?;
    let mut values = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        values.push(get_utf(buf)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes(symbolic_name: &str) -> ImmutableAttributes {
        ImmutableAttributes {
            bundle_repository_type: "usr".to_string(),
            symbolic_name: symbolic_name.to_string(),
            short_name: Some("foo-1.0".to_string()),
            feature_name: "usr:foo-1.0".to_string(),
            feature_version: 2,
            visibility: Visibility::Public,
            app_restart: AppForceRestart::Install,
            version: Version::new(1, 0, 0, "beta"),
            feature_file: Some(PathBuf::from("/opt/wlp/usr/extension/lib/features/foo.mf")),
            signature: FileSignature::new(1_700_000_000_000, 512),
            process_types: BTreeSet::from([ProcessType::Server, ProcessType::Client]),
            is_auto_feature: true,
            has_api_services: false,
            has_api_packages: true,
            has_spi_packages: false,
            is_singleton: true,
            disable_on_conflict: false,
            activation_type: ActivationType::Parallel,
            alternate_names: vec!["old-foo-1.0".to_string()],
            platforms: vec![],
        }
    }

    fn sample() -> CacheContents {
        CacheContents {
            features: vec![CachedFeature {
                attributes: attributes("com.example.foo"),
                raw_headers: [
                    Some("osgi.identity; filter:=\"(osgi.identity=x)\"".to_string()),
                    None,
                    Some("x".repeat(70_000)),
                    None,
                ],
            }],
            resolved: vec!["com.example.foo".to_string()],
            configured: vec!["foo-1.0".to_string()],
            configuration_error: true,
            bad_files: vec![BadFileEntry {
                path: PathBuf::from("/opt/wlp/lib/features/bad.mf"),
                signature: FileSignature::new(42_000, 7),
            }],
            platforms: vec!["jakartaee-10.0".to_string()],
            platform_env_var: Some("JAKARTAEE".to_string()),
        }
    }

    #[test]
    fn test_layout_header_and_version_tag() {
        let bytes = encode(&CacheContents::default(), false).unwrap();
        // version, feature count, resolved, configured, config error, bad files
        assert_eq!(bytes.len(), 4 + 4 + 4 + 4 + 1 + 4);
        assert_eq!(&bytes[..4], &3i32.to_be_bytes());

        let bytes = encode(&CacheContents::default(), true).unwrap();
        assert_eq!(&bytes[..4], &4i32.to_be_bytes());
        // plus platform count and env var flag
        assert_eq!(bytes.len(), 21 + 4 + 1);
    }

    #[test]
    fn test_decode_restores_contents() {
        let bytes = encode(&sample(), true).unwrap();
        let decoded = decode(&bytes, true).unwrap();

        let feature = &decoded.features[0];
        assert!(feature.attributes.is_identical(&attributes("com.example.foo")));
        assert_eq!(feature.attributes.feature_name, "usr:foo-1.0");
        assert_eq!(feature.raw_headers[1], None);
        assert_eq!(feature.raw_headers[2].as_ref().map(String::len), Some(70_000));
        assert_eq!(decoded.resolved, vec!["com.example.foo"]);
        assert_eq!(decoded.configured, vec!["foo-1.0"]);
        assert!(decoded.configuration_error);
        assert_eq!(decoded.bad_files, sample().bad_files);
        assert_eq!(decoded.platforms, vec!["jakartaee-10.0"]);
        assert_eq!(decoded.platform_env_var.as_deref(), Some("JAKARTAEE"));
    }

    #[test]
    fn test_platform_state_only_in_version_four() {
        let bytes = encode(&sample(), false).unwrap();
        let decoded = decode(&bytes, false).unwrap();
        assert!(decoded.platforms.is_empty());
        assert!(decoded.platform_env_var.is_none());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let bytes = encode(&sample(), false).unwrap();
        assert!(matches!(
            decode(&bytes, true),
            Err(CacheError::VersionMismatch {
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn test_truncated_input_is_io_error() {
        let bytes = encode(&sample(), false).unwrap();
        for cut in [2, 10, bytes.len() - 1] {
            assert!(matches!(
                decode(&bytes[..cut], false),
                Err(CacheError::Io(_))
            ));
        }
    }

    #[test]
    fn test_short_string_limit() {
        let mut contents = CacheContents::default();
        contents.resolved.push("y".repeat(SHORT_STRING_MAX + 1));
        assert!(matches!(
            encode(&contents, false),
            Err(CacheError::StringTooLong { .. })
        ));
    }

    #[test]
    fn test_unknown_enum_value() {
        let mut bytes = encode(&sample(), false).unwrap();
        let needle = b"PUBLIC";
        let pos = bytes
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        bytes[pos..pos + needle.len()].copy_from_slice(b"PUBLIX");
        assert!(matches!(
            decode(&bytes, false),
            Err(CacheError::InvalidEnum { kind: "visibility", .. })
        ));
    }
}
