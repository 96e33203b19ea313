//! sealpack CLI
//!
//! Generate keys, pack files into signed archives, and list, unpack or
//! verify existing archives.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sealpack::validation::{is_safe_relative_id, leaf_id_from_path};
use sealpack::{
    Archive, ArchiveConfig, Builder, BuilderConfig, CompressionMethod, Flags, KeyMaterial, Leaf,
    PackManifest,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "sealpack")]
#[command(version, about = "Signed archive container tool")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an Ed25519 keypair
    Keypair(KeypairArgs),
    /// Pack files into an archive
    Pack(PackArgs),
    /// List the leaves of an archive
    List(ListArgs),
    /// Extract every leaf into a directory
    Unpack(UnpackArgs),
    /// Check an archive's signature
    Verify(VerifyArgs),
    /// Split a .kp keypair into .sk and .pk files
    Split(SplitArgs),
}

#[derive(Args, Debug)]
struct KeypairArgs {
    /// Output path without extension
    #[arg(short, long, default_value = "sealpack")]
    output: PathBuf,

    /// Write separate .sk and .pk files instead of one .kp
    #[arg(long)]
    split: bool,
}

#[derive(Args, Debug)]
struct SplitArgs {
    /// Keypair file (.kp)
    #[arg(short, long)]
    input: PathBuf,

    /// Output path without extension (defaults to the input's)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PackArgs {
    /// Archive to write (defaults to the manifest's output)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Signing key (.sk or .kp)
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// User flag bits for the archive header, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_user_flags, default_value = "0")]
    flags: u16,

    /// Content version for every leaf
    #[arg(long, default_value_t = 0)]
    version: u8,

    /// Compress leaves (lz4 or zstd)
    #[arg(long)]
    compress: Option<CompressionMethod>,

    /// Record a SHA-256 digest for every leaf
    #[arg(long)]
    digest: bool,

    /// TOML pack manifest
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Files or directories to pack
    inputs: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(short, long)]
    input: PathBuf,

    /// Verifying key (.pk or .kp)
    #[arg(short = 'p', long)]
    public_key: Option<PathBuf>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct UnpackArgs {
    #[arg(short, long)]
    input: PathBuf,

    /// Directory to extract into
    #[arg(short, long)]
    output: PathBuf,

    /// Verifying key (.pk or .kp)
    #[arg(short = 'p', long)]
    public_key: Option<PathBuf>,

    /// Stop at the first leaf that does not verify
    #[arg(long)]
    require_verified: bool,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    #[arg(short, long)]
    input: PathBuf,

    /// Verifying key (.pk or .kp)
    #[arg(short = 'p', long)]
    public_key: PathBuf,
}

fn parse_user_flags(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid flags '{s}': {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Keypair(args) => keypair(args),
        Command::Pack(args) => pack(args),
        Command::List(args) => list(args),
        Command::Unpack(args) => unpack(args),
        Command::Verify(args) => verify(args),
        Command::Split(args) => split(args),
    }
}

fn keypair(args: KeypairArgs) -> Result<()> {
    let keys = KeyMaterial::generate();

    if args.split {
        write_split_keys(&keys, &args.output)?;
    } else {
        let kp = args.output.with_extension("kp");
        let pair = keys
            .keypair_bytes()
            .context("generated key cannot sign")?;
        fs::write(&kp, pair).with_context(|| format!("writing {}", kp.display()))?;
        info!(keypair = %kp.display(), "wrote keypair");
    }

    println!("{}", keys.fingerprint());
    Ok(())
}

fn split(args: SplitArgs) -> Result<()> {
    let bytes = fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let keys = KeyMaterial::from_keypair_bytes(&bytes)
        .with_context(|| format!("{} is not a keypair", args.input.display()))?;

    let stem = args.output.unwrap_or_else(|| args.input.clone());
    write_split_keys(&keys, &stem)?;
    println!("{}", keys.fingerprint());
    Ok(())
}

/// Write `<stem>.sk` and `<stem>.pk`
fn write_split_keys(keys: &KeyMaterial, stem: &Path) -> Result<(PathBuf, PathBuf)> {
    let sk = stem.with_extension("sk");
    let pk = stem.with_extension("pk");
    let secret = keys.signing_bytes().context("key material cannot sign")?;
    fs::write(&sk, secret).with_context(|| format!("writing {}", sk.display()))?;
    fs::write(&pk, keys.verifying_bytes())
        .with_context(|| format!("writing {}", pk.display()))?;
    info!(secret = %sk.display(), public = %pk.display(), "wrote keys");
    Ok((sk, pk))
}

fn pack(args: PackArgs) -> Result<()> {
    let keys = args
        .key
        .as_ref()
        .map(|path| {
            KeyMaterial::load_signing_file(path)
                .with_context(|| format!("loading signing key {}", path.display()))
        })
        .transpose()?;

    let (mut builder, manifest_output) = match &args.manifest {
        Some(path) => {
            let manifest = PackManifest::from_path(path)
                .with_context(|| format!("reading manifest {}", path.display()))?;
            let base = path.parent().unwrap_or(Path::new("."));
            let builder = manifest.to_builder(base, keys)?;
            (builder, Some(manifest.output_path(base)))
        }
        None => {
            let mut config = BuilderConfig::new().flags(Flags::from_bits(u32::from(args.flags)));
            if let Some(keys) = keys {
                config = config.keys(keys);
            }
            (Builder::new(config), None)
        }
    };

    let output = match (args.output, manifest_output) {
        (Some(output), _) => output,
        (None, Some(output)) => output,
        (None, None) => bail!("no output given, pass -o or a manifest"),
    };
    let existing_output = fs::canonicalize(&output).ok();

    for input in &args.inputs {
        let root = input.parent().unwrap_or(Path::new(""));
        for file in collect_files(input)? {
            if existing_output.is_some() && fs::canonicalize(&file).ok() == existing_output {
                debug!(file = %file.display(), "skipping the output archive");
                continue;
            }
            let id = leaf_id_from_path(root, &file)?;
            let leaf = Leaf::from_file(id, &file)?
                .compress(args.compress.unwrap_or(CompressionMethod::None))
                .digest(args.digest)
                .version(args.version);
            builder.add_leaf(leaf)?;
        }
    }

    if builder.is_empty() {
        warn!("no leaves to pack, writing an empty archive");
    }

    let written = builder.dump_to_file(&output, |placement| {
        debug!(
            id = placement.id,
            length = placement.length,
            offset = placement.offset,
            flags = %placement.flags,
            "packed"
        );
    })?;

    println!(
        "{}: {} leaves, {} bytes{}",
        output.display(),
        builder.len(),
        written,
        if builder.config().will_sign() { ", signed" } else { "" }
    );
    Ok(())
}

/// Regular files under `path`, sorted for reproducible archives
fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", path.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn open_archive(
    input: &Path,
    public_key: Option<&Path>,
) -> Result<Archive<std::io::BufReader<fs::File>>> {
    let mut config = ArchiveConfig::new();
    if let Some(path) = public_key {
        let keys = KeyMaterial::load_verifying_file(path)
            .with_context(|| format!("loading verifying key {}", path.display()))?;
        config = config.verifying_key(keys);
    }
    Archive::open_file(input, config).with_context(|| format!("opening {}", input.display()))
}

#[derive(Serialize)]
struct Listing {
    leaves: Vec<ListedLeaf>,
    status: sealpack::VerificationStatus,
    signer: Option<String>,
}

#[derive(Serialize)]
struct ListedLeaf {
    id: String,
    offset: u64,
    length: u64,
    flags: u32,
    compressed: Option<&'static str>,
    version: u8,
    digest: Option<String>,
}

fn list(args: ListArgs) -> Result<()> {
    let archive = open_archive(&args.input, args.public_key.as_deref())?;
    if args.public_key.is_some() && archive.is_signed() {
        // Populate the status before printing it
        let _ = archive.verify();
    }

    if args.json {
        let listing = Listing {
            leaves: archive
                .entries()
                .iter()
                .map(|entry| ListedLeaf {
                    id: entry.id.to_string(),
                    offset: entry.offset,
                    length: entry.length,
                    flags: entry.flags.bits(),
                    compressed: entry
                        .is_compressed()
                        .then(|| CompressionMethod::from_flags(entry.flags).as_str()),
                    version: entry.content_version,
                    digest: entry.digest.map(hex::encode),
                })
                .collect(),
            status: archive.verification_status(),
            signer: archive.signer_fingerprint(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{archive}");
    for entry in archive.entries() {
        println!("  {entry}");
    }
    Ok(())
}

fn unpack(args: UnpackArgs) -> Result<()> {
    let archive = open_archive(&args.input, args.public_key.as_deref())?;
    if args.require_verified {
        archive.verify().context("archive signature")?;
    }

    fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let mut unverified = 0usize;
    for id in archive.get_entries() {
        if !is_safe_relative_id(id) {
            warn!(id, "skipping leaf whose id is not a safe relative path");
            continue;
        }

        let resource = archive.fetch(id)?;
        if !resource.verified {
            if args.require_verified {
                bail!("leaf '{id}' did not verify");
            }
            unverified += 1;
        }

        let target = args.output.join(id);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, resource.data())
            .with_context(|| format!("writing {}", target.display()))?;
        debug!(id, bytes = resource.len(), verified = resource.verified, "unpacked");
    }

    println!(
        "unpacked {} leaves into {} ({})",
        archive.len(),
        args.output.display(),
        archive.verification_status()
    );
    if unverified > 0 {
        warn!(unverified, "some leaves did not verify");
    }
    Ok(())
}

fn verify(args: VerifyArgs) -> Result<()> {
    let archive = open_archive(&args.input, Some(args.public_key.as_path()))?;
    archive
        .verify()
        .with_context(|| format!("{} failed verification", args.input.display()))?;

    println!("{}: {}", args.input.display(), archive.verification_status());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_collect_files_nested_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("assets");
        touch(&root.join("b.txt"), b"b");
        touch(&root.join("a/z.txt"), b"z");
        touch(&root.join("a/deep/er/x.bin"), b"x");
        fs::create_dir_all(root.join("empty")).unwrap();

        let files = collect_files(&root).unwrap();
        let ids: Vec<String> = files
            .iter()
            .map(|file| leaf_id_from_path(dir.path(), file).unwrap().to_string())
            .collect();

        assert_eq!(ids, vec!["assets/a/deep/er/x.bin", "assets/a/z.txt", "assets/b.txt"]);
    }

    #[test]
    fn test_collect_files_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("one.txt");
        touch(&file, b"1");

        assert_eq!(collect_files(&file).unwrap(), vec![file]);
    }

    #[test]
    fn test_collect_files_missing_path() {
        let dir = TempDir::new().unwrap();
        let err = collect_files(&dir.path().join("nope")).unwrap_err();
        assert!(format!("{err:#}").contains("walking"));
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_files_follows_symlinked_directories() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("real/inner.txt"), b"i");
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), root.join("link")).unwrap();

        let files = collect_files(&root).unwrap();
        assert_eq!(files, vec![root.join("link").join("inner.txt")]);
    }

    #[test]
    fn test_split_keys_round_trip() {
        let dir = TempDir::new().unwrap();
        let keys = KeyMaterial::generate();

        let (sk, pk) = write_split_keys(&keys, &dir.path().join("release")).unwrap();
        assert_eq!(sk, dir.path().join("release.sk"));
        assert_eq!(pk, dir.path().join("release.pk"));

        let signing = KeyMaterial::load_signing_file(&sk).unwrap();
        let verifying = KeyMaterial::load_verifying_file(&pk).unwrap();
        assert!(signing.can_sign());
        assert!(!verifying.can_sign());
        assert_eq!(signing.fingerprint(), keys.fingerprint());
        assert_eq!(verifying.fingerprint(), keys.fingerprint());
    }

    #[test]
    fn test_split_keys_needs_signing_half() {
        let dir = TempDir::new().unwrap();
        let keys = KeyMaterial::generate().to_verifying();

        let err = write_split_keys(&keys, &dir.path().join("public")).unwrap_err();
        assert!(err.to_string().contains("cannot sign"));
        assert!(!dir.path().join("public.sk").exists());
    }

    #[test]
    fn test_parse_user_flags() {
        assert_eq!(parse_user_flags("0x1234").unwrap(), 0x1234);
        assert_eq!(parse_user_flags("17").unwrap(), 17);
        assert!(parse_user_flags("0x10000").is_err());
    }
}
