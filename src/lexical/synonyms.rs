//! Synonym table for trades phrasing (British English)
//!
//! Each group is a canonical term followed by its synonyms. Expansion is
//! bidirectional: any member of a group expands to every other member.

use std::collections::{BTreeSet, HashMap};

const TRADES_SYNONYMS: &[(&str, &[&str])] = &[
    ("tap", &["faucet", "mixer", "taps"]),
    ("leak", &["leaking", "leaks", "leaky", "leaked", "drip", "dripping", "drips", "dripped"]),
    ("fix", &["repair", "mend", "sort", "fixing", "repairing", "broken"]),
    ("replace", &["replacement", "swap", "change", "new"]),
    ("install", &["fit", "fitting", "fitted", "installation", "mount", "mounting", "put"]),
    ("hang", &["hanging", "mount", "mounting", "put"]),
    ("shelf", &["shelves", "shelving"]),
    ("toilet", &["loo", "wc", "lavatory", "cistern"]),
    ("flush", &["flushing", "running"]),
    ("sink", &["basin", "washbasin"]),
    ("blocked", &["blockage", "clogged", "unblock"]),
    ("drain", &["drains", "plughole", "waste"]),
    ("door", &["doors"]),
    ("handle", &["handles", "knob", "knobs"]),
    ("lock", &["locks", "latch"]),
    ("hinge", &["hinges"]),
    ("window", &["windows", "pane"]),
    ("radiator", &["rad", "rads", "radiators"]),
    ("bleed", &["bleeding", "airlock"]),
    ("socket", &["sockets", "plug", "outlet"]),
    ("light", &["lights", "lamp", "bulb", "bulbs", "downlight", "downlights"]),
    ("switch", &["switches", "dimmer"]),
    ("tv", &["television", "telly"]),
    ("bracket", &["brackets"]),
    ("curtain", &["curtains", "pole", "rail", "track"]),
    ("blind", &["blinds"]),
    ("picture", &["pictures", "frame", "frames", "mirror", "mirrors", "artwork"]),
    ("paint", &["painting", "decorate", "decorating", "repaint"]),
    ("tile", &["tiles", "tiling", "tiled"]),
    ("grout", &["grouting", "regrout"]),
    ("silicone", &["sealant", "mastic", "reseal", "seal"]),
    ("gutter", &["gutters", "guttering"]),
    ("fence", &["fencing", "panel", "panels"]),
    ("assemble", &["assembly", "flatpack", "build", "building"]),
    ("wardrobe", &["wardrobes", "closet"]),
    ("cupboard", &["cupboards", "cabinet", "cabinets"]),
    ("shower", &["showers", "showerhead"]),
    ("bath", &["bathtub", "tub"]),
    ("plaster", &["plastering", "skim", "patch", "filler"]),
    ("hole", &["holes", "dent"]),
    ("alarm", &["detector", "alarms"]),
];

/// Bidirectional synonym lookup
#[derive(Debug, Clone)]
pub struct SynonymTable {
    groups: Vec<Vec<String>>,
    index: HashMap<String, Vec<usize>>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::from_groups(
            TRADES_SYNONYMS
                .iter()
                .map(|(canonical, synonyms)| {
                    (
                        canonical.to_string(),
                        synonyms.iter().map(|s| s.to_string()).collect(),
                    )
                }),
        )
    }
}

impl SynonymTable {
    /// Build from `(canonical, synonyms)` pairs
    pub fn from_groups<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut table = Self {
            groups: Vec::new(),
            index: HashMap::new(),
        };
        for (canonical, synonyms) in groups {
            let mut members: Vec<String> = Vec::new();
            for member in std::iter::once(canonical).chain(synonyms) {
                let member = member.to_lowercase();
                if !members.contains(&member) {
                    members.push(member);
                }
            }
            let group_id = table.groups.len();
            for member in &members {
                table
                    .index
                    .entry(member.clone())
                    .or_default()
                    .push(group_id);
            }
            table.groups.push(members);
        }
        table
    }

    /// The token itself plus every member of every group it belongs to
    pub fn expand(&self, token: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        out.insert(token.to_string());
        if let Some(group_ids) = self.index.get(token) {
            for &id in group_ids {
                // Multi-word members cannot match single tokens
                out.extend(
                    self.groups[id]
                        .iter()
                        .filter(|m| !m.contains(' '))
                        .cloned(),
                );
            }
        }
        out
    }

    /// Expand every token, preserving determinism via ordered sets
    pub fn expand_all<'a, I>(&self, tokens: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tokens
            .into_iter()
            .flat_map(|t| self.expand(t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
