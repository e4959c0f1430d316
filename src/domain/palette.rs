use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PaletteEntry {
    pub background: &'static str,
    pub border: &'static str,
    pub text: &'static str,
    pub accent: &'static str,
}

pub const PROVIDER_PALETTE: [PaletteEntry; 8] = [
    PaletteEntry { background: "#e0f2fe", border: "#0284c7", text: "#075985", accent: "#0ea5e9" },
    PaletteEntry { background: "#dcfce7", border: "#16a34a", text: "#166534", accent: "#22c55e" },
    PaletteEntry { background: "#fef3c7", border: "#d97706", text: "#92400e", accent: "#f59e0b" },
    PaletteEntry { background: "#fce7f3", border: "#db2777", text: "#9d174d", accent: "#ec4899" },
    PaletteEntry { background: "#ede9fe", border: "#7c3aed", text: "#5b21b6", accent: "#8b5cf6" },
    PaletteEntry { background: "#ffedd5", border: "#ea580c", text: "#9a3412", accent: "#f97316" },
    PaletteEntry { background: "#ccfbf1", border: "#0d9488", text: "#115e59", accent: "#14b8a6" },
    PaletteEntry { background: "#fee2e2", border: "#dc2626", text: "#991b1b", accent: "#ef4444" },
];

/// Index lookup against the full roster; unknown or absent providers get the first entry.
pub fn color_for<S: AsRef<str>>(provider_id: Option<&str>, roster: &[S]) -> &'static PaletteEntry {
    provider_id
        .and_then(|provider_id| roster.iter().position(|candidate| candidate.as_ref() == provider_id))
        .map(|index| &PROVIDER_PALETTE[index % PROVIDER_PALETTE.len()])
        .unwrap_or(&PROVIDER_PALETTE[0])
}

/// Provider-to-palette mapping built once per session and shared by every view.
#[derive(Debug, Clone, Default)]
pub struct ProviderPalette {
    assignments: HashMap<String, usize>,
}

impl ProviderPalette {
    pub fn from_roster<S: AsRef<str>>(roster: &[S]) -> Self {
        let mut assignments = HashMap::with_capacity(roster.len());
        for (index, provider_id) in roster.iter().enumerate() {
            assignments
                .entry(provider_id.as_ref().to_string())
                .or_insert(index % PROVIDER_PALETTE.len());
        }
        Self { assignments }
    }

    pub fn entry_for(&self, provider_id: Option<&str>) -> &'static PaletteEntry {
        provider_id
            .and_then(|provider_id| self.assignments.get(provider_id))
            .map(|index| &PROVIDER_PALETTE[*index])
            .unwrap_or(&PROVIDER_PALETTE[0])
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
