//! Rendering of the fetched profile.

use std::fmt::Write;

use crate::userinfo::UserProfile;

/// Claims shown in the key details block, with their labels.
const KEY_DETAILS: [(&str, &str); 4] = [
    ("ID", "sub"),
    ("Name", "name"),
    ("Email", "email"),
    ("Role", "role"),
];

/// How the profile is printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty JSON followed by the key details.
    #[default]
    Report,
    /// Pretty JSON only.
    Json,
}

/// Render the profile for standard output.
pub fn render(profile: &UserProfile, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format!("{}\n", profile.to_pretty_json()),
        OutputFormat::Report => {
            let mut out = String::new();
            let _ = writeln!(out, "User Information:");
            let _ = writeln!(out, "{}", profile.to_pretty_json());
            let _ = writeln!(out);
            let _ = writeln!(out, "Key User Details:");
            for (label, claim) in KEY_DETAILS {
                let _ = writeln!(out, "{}: {}", label, profile.display_claim(claim));
            }
            out
        }
    }
}
