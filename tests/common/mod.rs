#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use reqwest::Url;
use zip::write::SimpleFileOptions;

pub fn write_bundle(path: &Path, symbolic_name: &str, version: &str) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    zip.start_file("META-INF/MANIFEST.MF", SimpleFileOptions::default())
        .unwrap();
    write!(
        zip,
        "Manifest-Version: 1.0\r\nBundle-SymbolicName: {symbolic_name}\r\nBundle-Version: {version}\r\n\r\n"
    )
    .unwrap();
    zip.finish().unwrap();
}

/// Write a system bundle, a definition naming it, and a config file under
/// `root`; returns the config path. `extra` is appended to the top level.
pub fn write_launch_files(root: &Path, extra: &str) -> PathBuf {
    let repo = root.join("repo");
    fs::create_dir_all(&repo).unwrap();
    let system = repo.join("framework.jar");
    write_bundle(&system, "org.example.framework", "2.1.0");

    fs::write(
        root.join("platform.toml"),
        format!("[system]\nurl = \"{}\"\n", Url::from_file_path(&system).unwrap()),
    )
    .unwrap();

    let config_path = root.join("runner.toml");
    fs::write(
        &config_path,
        format!(
            "working_directory = \"work\"\n\
             execution_environment = \"NONE\"\n\
             {extra}\
             [platform]\n\
             main_class = \"org.example.framework.Main\"\n\
             definition = \"platform.toml\"\n"
        ),
    )
    .unwrap();
    config_path
}
