//! Per-document resource identity.
//!
//! The registry maps a `(kind, key)` pair to at most one emitted object and
//! hands out writer-visible names (`F1`, `P3`, ...). Containers collect the
//! resources they use in a [`ResourceListBuilder`], which is finalized into
//! an immutable [`ResourceList`] once everything it names has been rendered.

use crate::debug::DebugLogger;
use crate::error::ResourceError;
use crate::writer::{ObjRef, PdfWriter};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Font,
    XObject,
    ExtGState,
    Pattern,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Font => "Font",
            ResourceKind::XObject => "XObject",
            ResourceKind::ExtGState => "ExtGState",
            ResourceKind::Pattern => "Pattern",
        }
    }

    fn name_prefix(self) -> &'static str {
        match self {
            ResourceKind::Font => "F",
            ResourceKind::XObject => "Im",
            ResourceKind::ExtGState => "GS",
            ResourceKind::Pattern => "P",
        }
    }
}

/// Identity of a resource. Keys compare case-insensitively so that file
/// paths and family names differing only in case resolve to one resource.
#[derive(Debug, Clone)]
pub struct ResourceKey {
    kind: ResourceKind,
    key: String,
    normalized: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, key: impl Into<String>) -> Self {
        let key = key.into();
        let normalized = key.trim().to_lowercase();
        Self {
            kind,
            key,
            normalized,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for ResourceKey {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.normalized == other.normalized
    }
}

impl Eq for ResourceKey {}

impl Hash for ResourceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.normalized.hash(state);
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.key)
    }
}

#[derive(Debug, Default)]
struct RegistryEntry {
    name: Option<String>,
    reference: Option<ObjRef>,
    rendering: bool,
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: HashMap<ResourceKey, RegistryEntry>,
    counters: HashMap<ResourceKind, usize>,
    debug: Option<DebugLogger>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_debug(debug: Option<DebugLogger>) -> Self {
        Self {
            debug,
            ..Self::default()
        }
    }

    /// The writer-visible name of `key`, allocating the next `<prefix><n>` if it has none.
    pub fn name_for(&mut self, key: &ResourceKey) -> String {
        let entry = self.entries.entry(key.clone()).or_default();
        if let Some(name) = &entry.name {
            return name.clone();
        }
        let counter = self.counters.entry(key.kind).or_insert(0);
        *counter += 1;
        let name = format!("{}{}", key.kind.name_prefix(), counter);
        entry.name = Some(name.clone());
        name
    }

    /// Records that the container behind `list` uses `key`, returning its name.
    pub fn register(&mut self, key: &ResourceKey, list: &mut ResourceListBuilder) -> String {
        let name = self.name_for(key);
        list.record(key.clone(), &name);
        name
    }

    pub fn reference(&self, key: &ResourceKey) -> Option<ObjRef> {
        self.entries.get(key).and_then(|entry| entry.reference)
    }

    pub fn is_rendered(&self, key: &ResourceKey) -> bool {
        self.reference(key).is_some()
    }

    /// Returns the cached reference for `key`, or runs `emit` once and caches its result.
    ///
    /// A failed emission leaves no trace, so a later call may retry. Asking
    /// for a key from inside its own emission is a cycle and panics.
    pub fn ensure_rendered<F>(
        &mut self,
        key: &ResourceKey,
        writer: &mut PdfWriter,
        emit: F,
    ) -> Result<ObjRef, ResourceError>
    where
        F: FnOnce(&mut ResourceRegistry, &mut PdfWriter, &str) -> Result<ObjRef, ResourceError>,
    {
        if let Some(reference) = self.reference(key) {
            return Ok(reference);
        }
        let name = self.name_for(key);
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.rendering {
                panic!("resource {} requested while it is being rendered", key);
            }
            entry.rendering = true;
        }

        let result = emit(self, writer, &name);

        let entry = self.entries.entry(key.clone()).or_default();
        entry.rendering = false;
        let reference = result?;
        entry.reference = Some(reference);

        log::trace!("emitted {} as {} ({})", key, name, reference);
        if let Some(debug) = &self.debug {
            debug.resource_emitted(key.kind.as_str(), key.key(), Some(&name), reference.number());
        }
        Ok(reference)
    }
}

/// Accumulates the resources a container (page, form, tiling pattern) uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceListBuilder {
    entries: BTreeMap<(ResourceKind, String), ResourceKey>,
}

impl ResourceListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, key: ResourceKey, name: &str) {
        self.entries
            .entry((key.kind, name.to_string()))
            .or_insert(key);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.entries.values()
    }

    /// Resolves every recorded key against the registry.
    pub fn finish(&self, registry: &ResourceRegistry) -> Result<ResourceList, ResourceError> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for ((kind, name), key) in &self.entries {
            let reference = registry
                .reference(key)
                .ok_or_else(|| ResourceError::UnrenderedResource(key.to_string()))?;
            entries.push((*kind, name.clone(), reference));
        }
        Ok(ResourceList { entries })
    }
}

/// A finalized `/Resources` dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceList {
    entries: Vec<(ResourceKind, String, ObjRef)>,
}

impl ResourceList {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, kind: ResourceKind, name: &str) -> Option<ObjRef> {
        self.entries
            .iter()
            .find(|(k, n, _)| *k == kind && n == name)
            .map(|(_, _, reference)| *reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write(&self, writer: &mut PdfWriter) {
        writer.begin_dictionary();
        let mut current: Option<ResourceKind> = None;
        for (kind, name, reference) in &self.entries {
            if current != Some(*kind) {
                if current.is_some() {
                    writer.end_dictionary();
                }
                writer.begin_entry(kind.as_str());
                writer.begin_dictionary();
                current = Some(*kind);
            }
            writer.entry_ref(name, *reference);
        }
        if current.is_some() {
            writer.end_dictionary();
        }
        writer.begin_entry("ProcSet");
        writer.begin_array();
        for procset in ["PDF", "Text", "ImageB", "ImageC"] {
            writer.write_name(procset);
        }
        writer.end_array();
        writer.end_dictionary();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::PdfVersion;

    fn stub_emit(
        calls: &mut usize,
    ) -> impl FnOnce(&mut ResourceRegistry, &mut PdfWriter, &str) -> Result<ObjRef, ResourceError> + '_
    {
        move |_, writer, _| {
            *calls += 1;
            let reference = writer.begin_object();
            writer.write_int(1);
            writer.end_object();
            Ok(reference)
        }
    }

    #[test]
    fn ensure_rendered_emits_once() {
        let mut registry = ResourceRegistry::new();
        let mut writer = PdfWriter::new(PdfVersion::Pdf17);
        let key = ResourceKey::new(ResourceKind::Pattern, "stripes");
        let mut calls = 0;
        let first = registry
            .ensure_rendered(&key, &mut writer, stub_emit(&mut calls))
            .expect("first");
        let second = registry
            .ensure_rendered(&key, &mut writer, stub_emit(&mut calls))
            .expect("second");
        assert_eq!(first, second);
        assert_eq!(calls, 1);
        assert_eq!(writer.object_count(), 1);
    }

    #[test]
    fn keys_match_case_insensitively() {
        let a = ResourceKey::new(ResourceKind::XObject, "Images/Logo.PNG");
        let b = ResourceKey::new(ResourceKind::XObject, "images/logo.png");
        let c = ResourceKey::new(ResourceKind::Pattern, "images/logo.png");
        assert_eq!(a, b);
        assert_ne!(a, c);
        let mut registry = ResourceRegistry::new();
        assert_eq!(registry.name_for(&a), registry.name_for(&b));
    }

    #[test]
    fn names_count_per_kind() {
        let mut registry = ResourceRegistry::new();
        let f1 = registry.name_for(&ResourceKey::new(ResourceKind::Font, "Helvetica"));
        let p1 = registry.name_for(&ResourceKey::new(ResourceKind::Pattern, "grad"));
        let f2 = registry.name_for(&ResourceKey::new(ResourceKind::Font, "Courier"));
        let again = registry.name_for(&ResourceKey::new(ResourceKind::Font, "helvetica"));
        assert_eq!((f1.as_str(), p1.as_str(), f2.as_str()), ("F1", "P1", "F2"));
        assert_eq!(again, "F1");
    }

    #[test]
    fn failed_emission_is_not_cached() {
        let mut registry = ResourceRegistry::new();
        let mut writer = PdfWriter::new(PdfVersion::Pdf17);
        let key = ResourceKey::new(ResourceKind::Font, "Broken");
        let err = registry
            .ensure_rendered(&key, &mut writer, |_, _, _| {
                Err(ResourceError::UnknownResource("Broken".to_string()))
            })
            .expect_err("emission fails");
        assert!(matches!(err, ResourceError::UnknownResource(_)));
        assert!(!registry.is_rendered(&key));
        let mut calls = 0;
        registry
            .ensure_rendered(&key, &mut writer, stub_emit(&mut calls))
            .expect("retry");
        assert_eq!(calls, 1);
    }

    #[test]
    fn nested_emission_renders_children_first() {
        let mut registry = ResourceRegistry::new();
        let mut writer = PdfWriter::new(PdfVersion::Pdf17);
        let parent = ResourceKey::new(ResourceKind::Pattern, "tile");
        let child = ResourceKey::new(ResourceKind::Font, "Helvetica");
        let reference = registry
            .ensure_rendered(&parent, &mut writer, |registry, writer, name| {
                assert_eq!(name, "P1");
                let child_ref = registry.ensure_rendered(&child, writer, |_, writer, _| {
                    let r = writer.begin_object();
                    writer.write_int(0);
                    writer.end_object();
                    Ok(r)
                })?;
                let r = writer.begin_object();
                writer.write_ref(child_ref);
                writer.end_object();
                Ok(r)
            })
            .expect("render");
        assert_eq!(reference.number(), 2);
        assert_eq!(registry.reference(&child).map(|r| r.number()), Some(1));
    }

    #[test]
    #[should_panic(expected = "while it is being rendered")]
    fn self_reference_panics() {
        let mut registry = ResourceRegistry::new();
        let mut writer = PdfWriter::new(PdfVersion::Pdf17);
        let key = ResourceKey::new(ResourceKind::Pattern, "loop");
        let inner = key.clone();
        let _ = registry.ensure_rendered(&key, &mut writer, move |registry, writer, _| {
            registry.ensure_rendered(&inner, writer, |_, _, _| {
                Err(ResourceError::UnknownResource("loop".to_string()))
            })
        });
    }

    #[test]
    fn resource_list_groups_by_kind() {
        let mut registry = ResourceRegistry::new();
        let mut writer = PdfWriter::new(PdfVersion::Pdf17);
        let mut list = ResourceListBuilder::new();
        let font = ResourceKey::new(ResourceKind::Font, "Helvetica");
        let pattern = ResourceKey::new(ResourceKind::Pattern, "grad");
        registry.register(&font, &mut list);
        registry.register(&pattern, &mut list);
        registry.register(&font, &mut list);
        assert_eq!(list.len(), 2);
        assert!(matches!(
            list.finish(&registry),
            Err(ResourceError::UnrenderedResource(_))
        ));

        let mut calls = 0;
        registry
            .ensure_rendered(&font, &mut writer, stub_emit(&mut calls))
            .expect("font");
        registry
            .ensure_rendered(&pattern, &mut writer, stub_emit(&mut calls))
            .expect("pattern");
        let resources = list.finish(&registry).expect("finish");
        assert_eq!(resources.get(ResourceKind::Font, "F1").map(|r| r.number()), Some(1));

        let holder = writer.begin_object();
        resources.write(&mut writer);
        writer.end_object();
        let out = String::from_utf8_lossy(&writer.finish(Some(holder))).into_owned();
        assert!(out.contains(
            "<< /Font << /F1 1 0 R >> /Pattern << /P1 2 0 R >> /ProcSet [/PDF /Text /ImageB /ImageC] >>"
        ));
    }
}
