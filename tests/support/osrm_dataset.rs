//! Prepares an OSRM MLD dataset for the container test: downloads a
//! Geofabrik extract and runs the osrm-backend preprocessing tools.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug)]
pub enum DatasetError {
    Io(io::Error),
    Http(reqwest::Error),
    Docker(String),
}

impl From<io::Error> for DatasetError {
    fn from(err: io::Error) -> Self {
        DatasetError::Io(err)
    }
}

impl From<reqwest::Error> for DatasetError {
    fn from(err: reqwest::Error) -> Self {
        DatasetError::Http(err)
    }
}

#[derive(Debug, Clone)]
pub struct OsrmDataset {
    pub data_dir: PathBuf,
    pub osrm_file: String,
}

impl OsrmDataset {
    /// Ensures `<data_root>/<region name>` holds a preprocessed graph for the
    /// Geofabrik region path, e.g. `north-america/us/nevada`.
    pub fn ensure(region: &str, data_root: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let name = region.rsplit('/').next().unwrap_or("region");
        let data_root = data_root.into();
        let data_dir = if data_root.is_absolute() {
            data_root.join(name)
        } else {
            std::env::current_dir()?.join(data_root).join(name)
        };
        fs::create_dir_all(&data_dir)?;

        let pbf_file = format!("{name}-latest.osm.pbf");
        let pbf_path = data_dir.join(&pbf_file);
        if !pbf_path.exists() {
            download(&format!("https://download.geofabrik.de/{region}-latest.osm.pbf"), &pbf_path)?;
        }

        let osrm_file = format!("{name}-latest.osrm");
        let osrm_base = data_dir.join(&osrm_file);
        if !osrm_base.exists() {
            docker(&data_dir, &["osrm-extract", "-p", "/opt/car.lua", &format!("/data/{pbf_file}")])?;
        }
        if !osrm_base.with_extension("osrm.partition").exists() || !osrm_base.with_extension("osrm.cells").exists() {
            docker(&data_dir, &["osrm-partition", &format!("/data/{osrm_file}")])?;
            docker(&data_dir, &["osrm-customize", &format!("/data/{osrm_file}")])?;
        }

        Ok(Self { data_dir, osrm_file })
    }
}

fn download(url: &str, dest: &Path) -> Result<(), DatasetError> {
    let bytes = reqwest::blocking::get(url)?.error_for_status()?.bytes()?;
    let tmp_path = dest.with_extension("tmp");
    let mut writer = BufWriter::new(File::create(&tmp_path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    fs::rename(tmp_path, dest)?;
    Ok(())
}

fn docker(data_dir: &Path, args: &[&str]) -> Result<(), DatasetError> {
    let status = Command::new("docker")
        .args(["run", "--rm", "-t", "-v"])
        .arg(format!("{}:/data", data_dir.display()))
        .arg("osrm/osrm-backend")
        .args(args)
        .status()?;

    if status.success() {
        Ok(())
    } else {
        Err(DatasetError::Docker(format!("{} exited with {status}", args[0])))
    }
}
