//! Serializable description of the route convention.
//!
//! A manifest is the file-system layout written down: one entry per folder
//! with the slot markers present in it. It can be loaded from TOML or derived
//! from a list of marker-file paths such as `blog/[slug]/page.tsx`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::metadata::Metadata;
use crate::tree::builder::{RouteTreeBuilder, TreeBuildError};
use crate::tree::node::SlotKind;
use crate::tree::route_tree::RouteTree;

/// One folder of the convention.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ManifestEntry {
    /// Folder path relative to the app root ("" for the root).
    pub path: String,

    /// Slot markers present in the folder.
    #[serde(default)]
    pub slots: Vec<SlotKind>,

    /// Static metadata declared by the folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// The whole convention.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RouteManifest {
    #[serde(default, rename = "route")]
    pub entries: Vec<ManifestEntry>,
}

impl RouteManifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Derive a manifest from marker-file paths.
    ///
    /// The file stem selects the slot (`page`, `layout`, `template`, `loading`,
    /// `error`, `not-found`, `route`); extensions are ignored and unknown stems
    /// are co-located files that contribute nothing.
    pub fn from_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut folders: BTreeMap<String, Vec<SlotKind>> = BTreeMap::new();
        for file in files {
            let file = file.as_ref().trim_matches('/');
            let (folder, name) = match file.rsplit_once('/') {
                Some((folder, name)) => (folder, name),
                None => ("", file),
            };
            let stem = name.split('.').next().unwrap_or(name);
            let slots = folders.entry(folder.to_string()).or_default();
            if let Some(kind) = SlotKind::from_file_stem(stem) {
                if !slots.contains(&kind) {
                    slots.push(kind);
                }
            }
        }

        Self {
            entries: folders
                .into_iter()
                .map(|(path, slots)| ManifestEntry {
                    path,
                    slots,
                    metadata: None,
                })
                .collect(),
        }
    }

    /// Builder seeded with every entry; callers may attach capabilities before building.
    pub fn builder(&self) -> RouteTreeBuilder {
        self.entries.iter().fold(RouteTreeBuilder::new(), |builder, entry| {
            let builder = builder.slots(&entry.path, &entry.slots);
            match &entry.metadata {
                Some(metadata) => builder.metadata(&entry.path, metadata.clone()),
                None => builder,
            }
        })
    }

    pub fn build(&self) -> Result<RouteTree, TreeBuildError> {
        self.builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml() {
        let manifest = RouteManifest::from_toml(
            r#"
            [[route]]
            path = ""
            slots = ["layout", "page", "not_found"]

            [[route]]
            path = "(marketing)/about"
            slots = ["page"]
            metadata = { title = "About" }
            "#,
        )
        .unwrap();

        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[0].slots[2], SlotKind::NotFound);
        let tree = manifest.build().unwrap();
        assert!(tree.find("(marketing)/about").is_some());
    }

    #[test]
    fn test_from_files() {
        let manifest = RouteManifest::from_files([
            "layout.tsx",
            "page.tsx",
            "blog/[slug]/page.tsx",
            "blog/[slug]/loading.tsx",
            "blog/[slug]/utils.ts",
            "_lib/format.ts",
        ]);

        let blog = manifest
            .entries
            .iter()
            .find(|e| e.path == "blog/[slug]")
            .unwrap();
        assert_eq!(blog.slots, vec![SlotKind::Page, SlotKind::Loading]);

        let private = manifest.entries.iter().find(|e| e.path == "_lib").unwrap();
        assert!(private.slots.is_empty());
        assert_eq!(manifest.build().unwrap().routes().len(), 2);
    }
}
