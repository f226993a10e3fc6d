//! Test fixtures for deployer integration tests.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builder for `lambda.properties` manifests.
pub struct ManifestBuilder {
    entries: BTreeMap<String, String>,
}

impl ManifestBuilder {
    /// Creates a manifest with every required key set.
    pub fn new(function_name: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("FUNCTION_NAME".to_owned(), function_name.to_owned());
        entries.insert("HANDLER_NAME".to_owned(), "index.handler".to_owned());
        entries.insert("MEMORY_SIZE".to_owned(), "256".to_owned());
        entries.insert("TIMEOUT".to_owned(), "30".to_owned());
        entries.insert(
            "DEV_ARN_IAM_ROLE".to_owned(),
            "arn:aws:iam::123456789012:role/exec".to_owned(),
        );
        entries.insert("PUBLISH".to_owned(), "true".to_owned());
        Self { entries }
    }

    /// Sets a key, replacing any previous value.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Removes a key.
    pub fn without(mut self, key: &str) -> Self {
        self.entries.remove(key);
        self
    }

    /// Renders the manifest as properties text.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect()
    }

    /// Packs the manifest into a zip archive next to a handler file.
    pub fn archive(&self) -> Vec<u8> {
        ArchiveBuilder::new()
            .with_entry("index.js", "exports.handler = async () => 'ok';\n")
            .with_entry("config/lambda.properties", &self.render())
            .build()
    }
}

/// Builder for zip artifacts.
pub struct ArchiveBuilder {
    entries: Vec<(String, String)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a file entry.
    pub fn with_entry(mut self, name: &str, contents: &str) -> Self {
        self.entries.push((name.to_owned(), contents.to_owned()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, contents) in self.entries {
            writer.start_file(name, options).expect("start entry");
            writer.write_all(contents.as_bytes()).expect("write entry");
        }
        writer.finish().expect("finish archive").into_inner()
    }
}
