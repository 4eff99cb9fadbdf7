//! Hardware descriptor document.
//!
//! Line-oriented `key = "value"` text. Keys are case-insensitive and stored
//! lowercased; a later write to a key replaces the earlier one. Values escape
//! `"`, `|`, `#`, braces and control characters as `|XX` hex pairs.

use std::collections::BTreeMap;
use std::path::Path;
use vmforge_shared::constants::vmx_keys;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmxDocument {
    entries: BTreeMap<String, String>,
}

impl VmxDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> VmforgeResult<Self> {
        let mut doc = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(VmforgeError::Descriptor(format!(
                    "line {}: expected 'key = \"value\"', got '{}'",
                    index + 1,
                    line
                )));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(VmforgeError::Descriptor(format!(
                    "line {}: empty key",
                    index + 1
                )));
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            doc.set(key, unescape(value));
        }
        Ok(doc)
    }

    pub fn read_file(path: &Path) -> VmforgeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VmforgeError::Descriptor(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// Serialize deterministically: `.encoding` first, then sorted keys.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(encoding) = self.entries.get(vmx_keys::ENCODING) {
            out.push_str(&format!("{} = \"{}\"\n", vmx_keys::ENCODING, escape(encoding)));
        }
        for (key, value) in &self.entries {
            if key == vmx_keys::ENCODING {
                continue;
            }
            out.push_str(&format!("{} = \"{}\"\n", key, escape(value)));
        }
        out
    }

    pub fn write_file(&self, path: &Path) -> VmforgeResult<()> {
        std::fs::write(path, self.encode()).map_err(|e| {
            VmforgeError::Descriptor(format!("failed to write {}: {}", path.display(), e))
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Insert or overwrite. Returns the previous value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.to_ascii_lowercase(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(&key.to_ascii_lowercase())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    /// Remove every key starting with `prefix`. Returns how many were removed.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let prefix = prefix.to_ascii_lowercase();
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        before - self.entries.len()
    }

    /// Remove keys under `prefix` whose value is empty.
    pub fn remove_empty_under(&mut self, prefix: &str) {
        let prefix = prefix.to_ascii_lowercase();
        self.entries
            .retain(|key, value| !(key.starts_with(&prefix) && value.is_empty()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '|' | '#' | '{' | '}' => out.push_str(&format!("|{:02X}", c as u32)),
            c if c.is_ascii_control() => out.push_str(&format!("|{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '|'
            && let Some(hex) = value.get(i + 1..i + 3)
            && hex.bytes().all(|b| b.is_ascii_hexdigit())
            && let Ok(code) = u8::from_str_radix(hex, 16)
        {
            out.push(code as char);
            chars.next();
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}
