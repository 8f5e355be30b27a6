//! Capability registry: which backend claims which conversion pair.
//!
//! The registry is pure data built once at engine construction from the
//! backend set and its startup availability probe. Lookups never touch the
//! filesystem and the registry is never mutated afterwards, so it is shared
//! freely between concurrent requests.
//!
//! ## Ordering
//!
//! [`CapabilityRegistry::backends_for`] returns candidates grouped by
//! [`PriorityClass`] (direct transcoders, then the office suite, then the
//! cloud API) and, within a class, in registration order. Registration order
//! of the direct transcoders therefore encodes their priority.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Coarse ordering of backends: cheaper and more predictable classes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    DirectTranscoder,
    OfficeSuite,
    CloudApi,
}

impl PriorityClass {
    pub const ALL: [PriorityClass; 3] = [Self::DirectTranscoder, Self::OfficeSuite, Self::CloudApi];
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DirectTranscoder => "direct",
            Self::OfficeSuite => "office-suite",
            Self::CloudApi => "cloud",
        })
    }
}

/// Identity and startup availability of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub name: String,
    pub priority: PriorityClass,
    /// Probed once at startup; never re-checked per request.
    pub available: bool,
    /// Display name of the optional external engine behind this backend
    /// ("LibreOffice", "wkhtmltopdf", ...), `None` for built-in transcoders.
    pub engine: Option<String>,
    /// Actionable hint shown when the backend is unavailable.
    pub hint: Option<String>,
}

impl BackendDescriptor {
    pub fn new(name: impl Into<String>, priority: PriorityClass, available: bool) -> Self {
        Self {
            name: name.into(),
            priority,
            available,
            engine: None,
            hint: None,
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// The set of (input, output) pairs a backend claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claims {
    /// An explicit allow-list of pairs.
    Pairs(BTreeSet<(String, String)>),
    /// Every pair whose output some other backend recognises (cloud API).
    Any,
}

impl Claims {
    /// Exact pairs from a list of `(inputs, outputs)` groups. Identity pairs
    /// (`png → png`) are dropped.
    pub fn from_groups(groups: &[(&[&str], &[&str])]) -> Self {
        let mut set = BTreeSet::new();
        for (inputs, outputs) in groups {
            for i in *inputs {
                for o in *outputs {
                    if i != o {
                        set.insert((i.to_string(), o.to_string()));
                    }
                }
            }
        }
        Self::Pairs(set)
    }

    pub fn covers(&self, input_extension: &str, output_format: &str) -> bool {
        match self {
            Self::Pairs(set) => set.contains(&(input_extension.to_string(), output_format.to_string())),
            Self::Any => true,
        }
    }

    fn outputs(&self) -> impl Iterator<Item = &str> {
        let pairs = match self {
            Self::Pairs(set) => Some(set.iter()),
            Self::Any => None,
        };
        pairs.into_iter().flatten().map(|(_, o)| o.as_str())
    }
}

// ── Office-suite allow-list ──────────────────────────────────────────────────

const OFFICE_DOCS: &[&str] = &["doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp"];

/// Curated office-suite pairs. Office suites advertise many filters that do
/// not reliably round-trip; this list under-claims on purpose.
pub const OFFICE_SUITE_GROUPS: &[(&[&str], &[&str])] = &[
    (&["doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "rtf", "txt"], &["pdf"]),
    (OFFICE_DOCS, &["html"]),
    (&["doc"], &["docx"]),
    (&["docx"], &["doc", "odt", "pptx"]),
    (&["odt"], &["docx"]),
    (&["xls"], &["xlsx"]),
    (&["xlsx"], &["xls", "ods"]),
    (&["ods"], &["xlsx"]),
    (&["ppt"], &["pptx"]),
    (&["pptx"], &["ppt", "odp"]),
    (&["odp"], &["pptx"]),
    (&["txt"], &["doc", "docx", "odt"]),
    (&["rtf"], &["doc", "docx"]),
    (&["doc", "docx", "odt"], &["rtf"]),
    (&["pdf"], &["odt", "rtf"]),
    (&["html"], &["pdf", "doc", "docx", "odt"]),
];

/// `"<in>_to_<out>"`, the pair spelling used in capability listings.
pub fn pair_key(input_extension: &str, output_format: &str) -> String {
    format!("{input_extension}_to_{output_format}")
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// One registered backend and the pairs it claims.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub descriptor: BackendDescriptor,
    pub claims: Claims,
}

/// Read-only lookup table over every registered backend.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    entries: Vec<RegistryEntry>,
    known_outputs: BTreeSet<String>,
}

impl CapabilityRegistry {
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        let known_outputs = entries
            .iter()
            .flat_map(|e| e.claims.outputs())
            .map(str::to_string)
            .collect();
        Self {
            entries,
            known_outputs,
        }
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Every format some office or direct backend can write, sorted.
    pub fn known_outputs(&self) -> impl Iterator<Item = &str> {
        self.known_outputs.iter().map(String::as_str)
    }

    /// `true` when some backend of any class, available or not, recognises
    /// `output_format`.
    pub fn recognises_output(&self, output_format: &str) -> bool {
        self.known_outputs.contains(output_format)
    }

    /// `true` when the named backend is available and claims the pair.
    pub fn supports(&self, backend_name: &str, input_extension: &str, output_format: &str) -> bool {
        self.entries.iter().any(|e| {
            e.descriptor.name == backend_name
                && e.descriptor.available
                && self.claims_pair(e, input_extension, output_format)
        })
    }

    /// Available backends claiming the pair, ordered by priority class and
    /// then registration order. Empty when the output is unrecognised.
    pub fn backends_for(&self, input_extension: &str, output_format: &str) -> Vec<&BackendDescriptor> {
        self.candidate_indices(input_extension, output_format)
            .into_iter()
            .map(|i| &self.entries[i].descriptor)
            .collect()
    }

    /// Positions (into [`Self::entries`]) of the ordered candidates.
    pub(crate) fn candidate_indices(&self, input_extension: &str, output_format: &str) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.entries.len())
            .filter(|&i| {
                let e = &self.entries[i];
                e.descriptor.available && self.claims_pair(e, input_extension, output_format)
            })
            .collect();
        // Stable: registration order survives within a class.
        idx.sort_by_key(|&i| self.entries[i].descriptor.priority);
        idx
    }

    /// Hints for backends that would claim the pair but were unavailable at
    /// startup, per class, deduplicated.
    pub fn unavailable_hints(&self, input_extension: &str, output_format: &str) -> Vec<(PriorityClass, String)> {
        let mut seen = BTreeSet::new();
        let mut hints = Vec::new();
        for class in PriorityClass::ALL {
            for e in self.entries.iter().filter(|e| e.descriptor.priority == class) {
                if e.descriptor.available || !self.claims_pair(e, input_extension, output_format) {
                    continue;
                }
                if let Some(hint) = &e.descriptor.hint {
                    if seen.insert(hint.clone()) {
                        hints.push((class, hint.clone()));
                    }
                }
            }
        }
        hints
    }

    /// Display names of installed optional engines, in priority order.
    pub fn available_engines(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for class in PriorityClass::ALL {
            for e in self.entries.iter().filter(|e| e.descriptor.priority == class) {
                if let (true, Some(engine)) = (e.descriptor.available, &e.descriptor.engine) {
                    if !names.contains(engine) {
                        names.push(engine.clone());
                    }
                }
            }
        }
        names
    }

    /// Capability listing for client-facing introspection.
    pub fn capabilities(&self) -> Capabilities {
        let mut direct = BTreeSet::new();
        let mut office = BTreeSet::new();
        let mut cloud_fallback = false;

        for e in self.entries.iter().filter(|e| e.descriptor.available) {
            match (&e.claims, e.descriptor.priority) {
                (Claims::Any, _) => cloud_fallback = true,
                (Claims::Pairs(pairs), class) => {
                    let target = if class == PriorityClass::OfficeSuite {
                        &mut office
                    } else {
                        &mut direct
                    };
                    target.extend(pairs.iter().map(|(i, o)| pair_key(i, o)));
                }
            }
        }

        let supported: BTreeSet<String> = direct.union(&office).cloned().collect();
        Capabilities {
            direct_transcoder_pairs: direct.into_iter().collect(),
            office_suite_pairs: office.into_iter().collect(),
            cloud_fallback,
            supported_conversions: supported.into_iter().collect(),
            available_engines: self.available_engines(),
        }
    }

    fn claims_pair(&self, e: &RegistryEntry, input_extension: &str, output_format: &str) -> bool {
        match &e.claims {
            // The cloud claims everything some other backend recognises.
            Claims::Any => self.recognises_output(output_format),
            claims => claims.covers(input_extension, output_format),
        }
    }
}

/// Result of [`crate::ConversionEngine::get_capabilities`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub direct_transcoder_pairs: Vec<String>,
    /// Empty when the office suite was not found at startup.
    pub office_suite_pairs: Vec<String>,
    /// `false` when no cloud credential is configured.
    pub cloud_fallback: bool,
    /// Sorted union of the direct and office pairs.
    pub supported_conversions: Vec<String>,
    pub available_engines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, class: PriorityClass, available: bool, claims: Claims) -> RegistryEntry {
        RegistryEntry {
            descriptor: BackendDescriptor::new(name, class, available),
            claims,
        }
    }

    fn registry(office_available: bool, cloud_available: bool) -> CapabilityRegistry {
        CapabilityRegistry::new(vec![
            entry(
                "office-suite",
                PriorityClass::OfficeSuite,
                office_available,
                Claims::from_groups(OFFICE_SUITE_GROUPS),
            ),
            entry(
                "text-to-html",
                PriorityClass::DirectTranscoder,
                true,
                Claims::from_groups(&[(&["txt"], &["html"])]),
            ),
            RegistryEntry {
                descriptor: BackendDescriptor::new("cloud-api", PriorityClass::CloudApi, cloud_available)
                    .with_engine("CloudConvert API")
                    .with_hint("Configure CloudConvert API for additional format support"),
                claims: Claims::Any,
            },
        ])
    }

    #[test]
    fn from_groups_drops_identity() {
        let c = Claims::from_groups(&[(&["png", "jpg"], &["png", "jpg"])]);
        assert!(c.covers("png", "jpg"));
        assert!(c.covers("jpg", "png"));
        assert!(!c.covers("png", "png"));
    }

    #[test]
    fn direct_class_sorts_first() {
        let r = registry(true, true);
        let names: Vec<_> = r.backends_for("txt", "html").iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["text-to-html", "cloud-api"]);

        let names: Vec<_> = r.backends_for("docx", "pdf").iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["office-suite", "cloud-api"]);
    }

    #[test]
    fn unknown_output_has_no_candidates_even_with_cloud() {
        let r = registry(true, true);
        assert!(!r.recognises_output("exe"));
        assert!(r.backends_for("docx", "exe").is_empty());
    }

    #[test]
    fn known_outputs_ignore_cloud_and_availability() {
        let r = registry(false, true);
        let known: Vec<_> = r.known_outputs().collect();
        assert!(known.contains(&"odt"));
        assert!(known.contains(&"html"));
        assert!(!known.contains(&"exe"));
        assert!(known.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn office_allow_list_is_curated() {
        let r = registry(true, false);
        assert!(r.supports("office-suite", "docx", "pdf"));
        assert!(r.supports("office-suite", "html", "docx"));
        assert!(r.supports("office-suite", "pdf", "odt"));
        assert!(!r.supports("office-suite", "pdf", "docx"));
        assert!(!r.supports("office-suite", "png", "pdf"));
    }

    #[test]
    fn unavailable_backend_is_not_supported() {
        let r = registry(false, false);
        assert!(!r.supports("office-suite", "docx", "pdf"));
        assert!(r.backends_for("docx", "pdf").is_empty());
    }

    #[test]
    fn capabilities_exclude_missing_office_and_cloud() {
        let caps = registry(false, false).capabilities();
        assert!(caps.office_suite_pairs.is_empty());
        assert!(!caps.cloud_fallback);
        assert_eq!(caps.direct_transcoder_pairs, vec!["txt_to_html".to_string()]);
        assert_eq!(caps.supported_conversions, vec!["txt_to_html".to_string()]);

        let caps = registry(true, true).capabilities();
        assert!(caps.office_suite_pairs.contains(&"docx_to_pdf".to_string()));
        assert!(caps.cloud_fallback);
        assert_eq!(caps.available_engines, vec!["CloudConvert API".to_string()]);
    }

    #[test]
    fn supported_conversions_sorted_and_deduplicated() {
        let caps = registry(true, false).capabilities();
        let mut sorted = caps.supported_conversions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(caps.supported_conversions, sorted);
    }

    #[test]
    fn hints_only_for_claiming_unavailable_backends() {
        let r = registry(false, false);
        let hints = r.unavailable_hints("txt", "html");
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].0, PriorityClass::CloudApi);
    }
}
