//! Electron asar archives
//!
//! Packages a directory into the single-file `asar` format Electron loads
//! application code from, and reads archives back for verification.
//!
//! ## Layout
//!
//! ```text
//! u32le 4 | u32le H          size pickle
//! u32le P | u32le J | JSON   header pickle (H bytes, JSON padded to 4)
//! file bytes ...             offsets in the header are relative to here
//! ```

use crate::digest::sha256_hex;
use crate::result::{ElcovError, ElcovResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Block size used for per-block integrity hashes
pub const INTEGRITY_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Integrity record of one packed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    /// Always `SHA256`
    pub algorithm: String,
    /// Hex digest of the whole file
    pub hash: String,
    /// Block size in bytes
    #[serde(rename = "blockSize")]
    pub block_size: u64,
    /// Hex digest of each block
    pub blocks: Vec<String>,
}

impl Integrity {
    fn of(data: &[u8]) -> Self {
        let mut blocks: Vec<String> = data.chunks(INTEGRITY_BLOCK_SIZE).map(sha256_hex).collect();
        if blocks.is_empty() {
            blocks.push(sha256_hex(&[]));
        }
        Self {
            algorithm: "SHA256".to_string(),
            hash: sha256_hex(data),
            block_size: INTEGRITY_BLOCK_SIZE as u64,
            blocks,
        }
    }
}

/// Node of the archive header tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    /// Directory with named children
    Directory {
        /// Children by name
        files: BTreeMap<String, Entry>,
    },
    /// Packed (or unpacked) file
    File {
        /// Size in bytes
        size: u64,
        /// Decimal offset into the data section; absent when unpacked
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<String>,
        /// Stored next to the archive instead of inside it
        #[serde(default, skip_serializing_if = "is_false")]
        unpacked: bool,
        /// Unix executable bit
        #[serde(default, skip_serializing_if = "is_false")]
        executable: bool,
        /// Content hashes
        #[serde(default, skip_serializing_if = "Option::is_none")]
        integrity: Option<Integrity>,
    },
    /// Symbolic link inside the archive
    Link {
        /// Link target, relative to the archive root
        link: String,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl Entry {
    fn directory() -> Self {
        Self::Directory {
            files: BTreeMap::new(),
        }
    }
}

/// Package `src` into an asar archive at `dest`.
///
/// Subdirectories are included, entries are sorted by name and symlinks are
/// followed. An existing file at `dest` is replaced and missing parent
/// directories are created.
pub fn package_directory(src: &Path, dest: &Path) -> ElcovResult<PathBuf> {
    if !src.is_dir() {
        return Err(ElcovError::SourceNotFound {
            path: src.to_path_buf(),
        });
    }

    let mut root = BTreeMap::new();
    let mut packed: Vec<(PathBuf, u64)> = Vec::new();
    let mut offset = 0_u64;

    for entry in WalkDir::new(src)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| ElcovError::archive(format!("{} escapes the source root", entry.path().display())))?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let Some((name, parents)) = parts.split_last() else {
            continue;
        };
        let dir = descend(&mut root, parents)?;

        if entry.file_type().is_dir() {
            dir.entry(name.clone()).or_insert_with(Entry::directory);
        } else if entry.file_type().is_file() {
            let data = fs::read(entry.path()).map_err(|e| ElcovError::path_io(entry.path(), e))?;
            let size = data.len() as u64;
            dir.insert(
                name.clone(),
                Entry::File {
                    size,
                    offset: Some(offset.to_string()),
                    unpacked: false,
                    executable: is_executable(&entry),
                    integrity: Some(Integrity::of(&data)),
                },
            );
            packed.push((entry.path().to_path_buf(), size));
            offset += size;
        }
    }

    let header = serde_json::to_string(&Entry::Directory { files: root })?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ElcovError::path_io(parent, e))?;
    }
    let file = File::create(dest).map_err(|e| ElcovError::path_io(dest, e))?;
    let mut out = BufWriter::new(file);
    write_header(&mut out, &header).map_err(|e| ElcovError::path_io(dest, e))?;

    for (path, size) in &packed {
        let mut input = File::open(path).map_err(|e| ElcovError::path_io(path, e))?;
        let copied = io::copy(&mut input, &mut out).map_err(|e| ElcovError::path_io(dest, e))?;
        if copied != *size {
            return Err(ElcovError::archive(format!(
                "{} changed size while packaging",
                path.display()
            )));
        }
    }
    out.flush().map_err(|e| ElcovError::path_io(dest, e))?;

    tracing::info!(
        archive = %dest.display(),
        files = packed.len(),
        bytes = offset,
        "packaged asar archive"
    );
    Ok(dest.to_path_buf())
}

fn descend<'m>(
    mut files: &'m mut BTreeMap<String, Entry>,
    parents: &[String],
) -> ElcovResult<&'m mut BTreeMap<String, Entry>> {
    for part in parents {
        match files.entry(part.clone()).or_insert_with(Entry::directory) {
            Entry::Directory { files: children } => files = children,
            _ => return Err(ElcovError::archive(format!("{part} is not a directory"))),
        }
    }
    Ok(files)
}

#[cfg(unix)]
fn is_executable(entry: &walkdir::DirEntry) -> bool {
    use std::os::unix::fs::PermissionsExt;
    entry
        .metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_entry: &walkdir::DirEntry) -> bool {
    false
}

const fn align4(len: usize) -> usize {
    (len + 3) & !3
}

fn write_header(out: &mut impl Write, header: &str) -> io::Result<()> {
    let padded = align4(header.len());
    let payload = 4 + padded;
    let header_pickle = 4 + payload;

    out.write_all(&4_u32.to_le_bytes())?;
    out.write_all(&to_u32(header_pickle)?.to_le_bytes())?;
    out.write_all(&to_u32(payload)?.to_le_bytes())?;
    out.write_all(&to_u32(header.len())?.to_le_bytes())?;
    out.write_all(header.as_bytes())?;
    out.write_all(&[0_u8; 3][..padded - header.len()])?;
    Ok(())
}

fn to_u32(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "header too large"))
}

/// Read-only view of an asar archive
#[derive(Debug)]
pub struct AsarArchive {
    path: PathBuf,
    root: Entry,
    data_offset: u64,
}

impl AsarArchive {
    /// Open an archive and parse its header
    pub fn open(path: &Path) -> ElcovResult<Self> {
        let mut file = File::open(path).map_err(|e| ElcovError::path_io(path, e))?;

        let size_pickle = read_u32_pair(&mut file, path)?;
        if size_pickle.0 != 4 {
            return Err(ElcovError::archive(format!(
                "{} is not an asar archive",
                path.display()
            )));
        }
        let header_len = size_pickle.1 as usize;
        let mut header = vec![0_u8; header_len];
        file.read_exact(&mut header)
            .map_err(|e| ElcovError::path_io(path, e))?;

        let json_len = header
            .get(4..8)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or_else(|| ElcovError::archive("truncated header"))? as usize;
        let json = header
            .get(8..8 + json_len)
            .ok_or_else(|| ElcovError::archive("truncated header"))?;
        let root: Entry = serde_json::from_slice(json)?;

        Ok(Self {
            path: path.to_path_buf(),
            root,
            data_offset: 8 + header_len as u64,
        })
    }

    /// Header entry for a `/`-separated path
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        let mut node = &self.root;
        for part in name.split('/').filter(|p| !p.is_empty()) {
            match node {
                Entry::Directory { files } => node = files.get(part)?,
                _ => return None,
            }
        }
        Some(node)
    }

    /// Every file path in the archive, in name order
    #[must_use]
    pub fn list_files(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_files(&self.root, "", &mut names);
        names
    }

    /// Contents of a packed file
    pub fn read_file(&self, name: &str) -> ElcovResult<Vec<u8>> {
        let (size, offset) = match self.entry(name) {
            Some(Entry::File {
                size,
                offset: Some(offset),
                ..
            }) => (*size, offset),
            Some(_) => {
                return Err(ElcovError::archive(format!("{name} is not a packed file")))
            }
            None => return Err(ElcovError::archive(format!("{name} not found in archive"))),
        };
        let offset: u64 = offset
            .parse()
            .map_err(|_| ElcovError::archive(format!("bad offset for {name}")))?;

        let mut file = File::open(&self.path).map_err(|e| ElcovError::path_io(&self.path, e))?;
        file.seek(SeekFrom::Start(self.data_offset + offset))
            .map_err(|e| ElcovError::path_io(&self.path, e))?;
        let mut data = vec![0_u8; size as usize];
        file.read_exact(&mut data)
            .map_err(|e| ElcovError::path_io(&self.path, e))?;
        Ok(data)
    }
}

fn read_u32_pair(file: &mut File, path: &Path) -> ElcovResult<(u32, u32)> {
    let mut buf = [0_u8; 8];
    file.read_exact(&mut buf)
        .map_err(|e| ElcovError::path_io(path, e))?;
    let [a0, a1, a2, a3, b0, b1, b2, b3] = buf;
    Ok((
        u32::from_le_bytes([a0, a1, a2, a3]),
        u32::from_le_bytes([b0, b1, b2, b3]),
    ))
}

fn collect_files(node: &Entry, prefix: &str, out: &mut Vec<String>) {
    if let Entry::Directory { files } = node {
        for (name, child) in files {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            match child {
                Entry::Directory { .. } => collect_files(child, &path, out),
                _ => out.push(path),
            }
        }
    }
}
