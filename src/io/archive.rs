//! Uniform access to the files of a product, whether it is an extracted
//! directory or a zip archive read through its central directory.
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;
use zip::ZipArchive;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductFiles {
    Dir(PathBuf),
    Zip(PathBuf),
}

impl ProductFiles {
    pub fn new(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(ProductFiles::Dir(path.to_path_buf()));
        }
        let is_zip = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if is_zip && path.is_file() {
            return Ok(ProductFiles::Zip(path.to_path_buf()));
        }
        Err(Error::invalid_product(format!(
            "{} is neither a product directory nor a zip archive",
            path.display()
        )))
    }

    pub fn root(&self) -> &Path {
        match self {
            ProductFiles::Dir(p) | ProductFiles::Zip(p) => p,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, ProductFiles::Zip(_))
    }

    /// Relative paths of every file, `/`-separated, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut files = match self {
            ProductFiles::Dir(root) => {
                let mut out = Vec::new();
                walk(root, root, &mut out)?;
                out
            }
            ProductFiles::Zip(path) => {
                let mut archive = ZipArchive::new(File::open(path)?)?;
                let mut out = Vec::with_capacity(archive.len());
                for i in 0..archive.len() {
                    let file = archive.by_index(i)?;
                    if !file.is_dir() {
                        out.push(file.name().to_string());
                    }
                }
                out
            }
        };
        files.sort();
        Ok(files)
    }

    /// Files whose relative path matches `re`.
    pub fn find(&self, re: &Regex) -> Result<Vec<String>> {
        Ok(self.list()?.into_iter().filter(|f| re.is_match(f)).collect())
    }

    /// First file matching `pattern`, or `InvalidProduct` naming the pattern.
    pub fn find_one(&self, pattern: &str) -> Result<String> {
        let re = Regex::new(pattern)
            .map_err(|e| Error::EoReader(format!("bad pattern {pattern}: {e}")))?;
        self.find(&re)?.into_iter().next().ok_or_else(|| {
            Error::invalid_product(format!(
                "no file matching {} in {}",
                pattern,
                self.root().display()
            ))
        })
    }

    pub fn read_to_string(&self, rel: &str) -> Result<String> {
        match self {
            ProductFiles::Dir(root) => Ok(fs::read_to_string(root.join(rel))?),
            ProductFiles::Zip(path) => {
                let mut archive = ZipArchive::new(File::open(path)?)?;
                let mut file = archive.by_name(rel)?;
                let mut text = String::new();
                file.read_to_string(&mut text)?;
                Ok(text)
            }
        }
    }

    /// Path GDAL can open directly (`/vsizip/` inside archives).
    pub fn gdal_path(&self, rel: &str) -> PathBuf {
        match self {
            ProductFiles::Dir(root) => root.join(rel),
            ProductFiles::Zip(path) => {
                PathBuf::from(format!("/vsizip/{}/{}", path.display(), rel))
            }
        }
    }
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(parts.join("/"));
        }
    }
    Ok(())
}

/// Product name from its path: file name without archive or container suffix.
pub fn product_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = name.as_str();
    for suffix in [".zip", ".ZIP", ".tar", ".SAFE", ".SEN3"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped;
        }
    }
    name.to_string()
}
