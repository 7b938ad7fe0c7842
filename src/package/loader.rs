use std::fs::File;
use std::path::{Component, Path};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use prost::Message;
use tar::Archive;
use wasmtime::{Engine, Module};

use crate::package::schema::PackageSchema;
use crate::package::source::fetcher_for;
use crate::package::{PackageConfig, ServicePackage};

/// WASM modules begin with the 4-byte magic `\0asm`.
const WASM_MAGIC_NUMBER: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

const WASM_FILE: &str = "service.wasm";
const SCHEMA_FILE: &str = "service.description.json";
const CONFIG_FILE: &str = "okra.json";
const DESCRIPTOR_FILE: &str = "service.pb.desc";

/// Retrieve, extract, validate, and compile a service package from `source`
/// (a `file://` or `s3://` URL).
pub async fn load_package(source: &str, scratch_dir: &Path, engine: Arc<Engine>) -> Result<ServicePackage> {
    tokio::fs::create_dir_all(scratch_dir)
        .await
        .with_context(|| format!("failed to create scratch directory {}", scratch_dir.display()))?;

    // 1. Retrieve the archive to a scratch directory.
    let fetcher = fetcher_for(source)?;
    let archive_path = fetcher.fetch(scratch_dir).await?;

    let extract_dir = scratch_dir.join(format!("extract-{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&extract_dir).await?;

    // 2. Extract with strict name sanitization.
    extract_sanitized(&archive_path, &extract_dir)
        .with_context(|| format!("failed to extract package archive {}", archive_path.display()))?;

    // 3. Verify all four required files are present.
    let wasm_path = extract_dir.join(WASM_FILE);
    let schema_path = extract_dir.join(SCHEMA_FILE);
    let config_path = extract_dir.join(CONFIG_FILE);
    let descriptor_path = extract_dir.join(DESCRIPTOR_FILE);
    for (name, path) in [
        (WASM_FILE, &wasm_path),
        (SCHEMA_FILE, &schema_path),
        (CONFIG_FILE, &config_path),
        (DESCRIPTOR_FILE, &descriptor_path),
    ] {
        if !path.is_file() {
            bail!("package archive is missing required file {name}");
        }
    }

    // 4. Verify the WASM file begins with magic `00 61 73 6D`.
    let wasm_bytes = std::fs::read(&wasm_path).with_context(|| format!("failed to read {}", wasm_path.display()))?;
    if wasm_bytes.len() < 4 || wasm_bytes[..4] != WASM_MAGIC_NUMBER {
        bail!("{WASM_FILE} does not begin with the WASM magic number");
    }

    // 5. Parse config and schema; reject on name mismatch.
    let config: PackageConfig = serde_json::from_str(
        &std::fs::read_to_string(&config_path).with_context(|| format!("failed to read {CONFIG_FILE}"))?,
    )
    .with_context(|| format!("failed to parse {CONFIG_FILE}"))?;
    let schema: PackageSchema = serde_json::from_str(
        &std::fs::read_to_string(&schema_path).with_context(|| format!("failed to read {SCHEMA_FILE}"))?,
    )
    .with_context(|| format!("failed to parse {SCHEMA_FILE}"))?;

    let first_service_name = schema
        .first_service()
        .ok_or_else(|| anyhow!("{SCHEMA_FILE} declares no services"))?
        .name
        .clone();
    if config.name != first_service_name {
        bail!(
            "{CONFIG_FILE} service name {:?} does not match the first service in {SCHEMA_FILE} ({:?})",
            config.name,
            first_service_name
        );
    }

    // 6. Compile the WASM module.
    let module = Module::new(&engine, &wasm_bytes).context("failed to compile WASM module")?;

    // 7. Parse the FileDescriptorSet.
    let descriptor_bytes =
        std::fs::read(&descriptor_path).with_context(|| format!("failed to read {DESCRIPTOR_FILE}"))?;
    let descriptor_set = if descriptor_bytes.is_empty() {
        None
    } else {
        let file_descriptor_set = prost_types::FileDescriptorSet::decode(descriptor_bytes.as_slice())
            .with_context(|| format!("failed to parse {DESCRIPTOR_FILE}"))?;
        Some(
            prost_reflect::DescriptorPool::from_file_descriptor_set(file_descriptor_set)
                .context("failed to build descriptor pool from FileDescriptorSet")?,
        )
    };

    // 8. Assemble a Service Package; attach the descriptor set.
    ServicePackage::assemble(engine, module, schema, config, descriptor_set)
}

/// Unpack `archive_path` (gzipped tar) into `destination_dir`, refusing any
/// entry whose cleaned path contains `..` or would otherwise land outside
/// `destination_dir`.
fn extract_sanitized(archive_path: &Path, destination_dir: &Path) -> Result<()> {
    let tar_gz = File::open(archive_path)?;
    let tar = GzDecoder::new(tar_gz);
    let mut archive = Archive::new(tar);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        if entry_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
        {
            bail!("package archive entry escapes the scratch directory: {}", entry_path.display());
        }

        let target = destination_dir.join(&entry_path);
        if !target.starts_with(destination_dir) {
            bail!("package archive entry escapes the scratch directory: {}", entry_path.display());
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let buf = Vec::new();
        let enc = flate2::write::GzEncoder::new(buf, flate2::Compression::default());
        let mut builder = tar::Builder::new(enc);
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn rejects_parent_dir_escape() {
        let dir = tempfile::tempdir().unwrap();
        let archive_bytes = build_tar_gz(&[("../evil.txt", b"oops")]);
        let archive_path = dir.path().join("evil.tar.gz");
        std::fs::File::create(&archive_path)
            .unwrap()
            .write_all(&archive_bytes)
            .unwrap();

        let dest = dir.path().join("extract");
        std::fs::create_dir_all(&dest).unwrap();
        let result = extract_sanitized(&archive_path, &dest);
        assert!(result.is_err());
    }

    #[test]
    fn extracts_well_formed_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive_bytes = build_tar_gz(&[(WASM_FILE, &WASM_MAGIC_NUMBER)]);
        let archive_path = dir.path().join("pkg.tar.gz");
        std::fs::File::create(&archive_path)
            .unwrap()
            .write_all(&archive_bytes)
            .unwrap();

        let dest = dir.path().join("extract");
        std::fs::create_dir_all(&dest).unwrap();
        extract_sanitized(&archive_path, &dest).unwrap();
        assert!(dest.join(WASM_FILE).is_file());
    }
}
