use crate::models::AppCategory;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const SOCIAL_MEDIA_APPS: &[&str] = &[
    "com.facebook.katana",
    "com.instagram.android",
    "com.twitter.android",
    "com.snapchat.android",
    "com.whatsapp",
    "com.linkedin.android",
    "com.pinterest",
];

const PRODUCTIVITY_APPS: &[&str] = &[
    "com.google.android.apps.docs",
    "com.microsoft.office.word",
    "com.microsoft.office.excel",
    "com.microsoft.office.powerpoint",
    "com.evernote",
    "com.todoist",
    "com.notion",
];

const ENTERTAINMENT_APPS: &[&str] = &[
    "com.netflix.mediaclient",
    "com.spotify.music",
    "com.google.android.youtube",
    "com.amazon.avod.thirdpartyclient",
    "com.disney.disneyplus",
];

const GAMING_APPS: &[&str] = &[
    "com.supercell.clashofclans",
    "com.king.candycrushsaga",
    "com.mojang.minecraftpe",
    "com.pubg.mobile",
    "com.activision.callofduty.shooter",
];

const COMMUNICATION_APPS: &[&str] = &[
    "com.google.android.gm",
    "org.telegram.messenger",
    "com.discord",
    "com.Slack",
    "com.microsoft.teams",
    "us.zoom.videomeetings",
    "com.skype.raider",
];

const EDUCATION_APPS: &[&str] = &[
    "com.duolingo",
    "org.khanacademy.android",
    "org.coursera.android",
    "com.udemy.android",
    "com.quizlet.quizletandroid",
    "com.google.android.apps.classroom",
];

/// Tables in the order they are consulted.
const CATEGORY_TABLES: &[(AppCategory, &[&str])] = &[
    (AppCategory::SocialMedia, SOCIAL_MEDIA_APPS),
    (AppCategory::Productivity, PRODUCTIVITY_APPS),
    (AppCategory::Entertainment, ENTERTAINMENT_APPS),
    (AppCategory::Gaming, GAMING_APPS),
    (AppCategory::Communication, COMMUNICATION_APPS),
    (AppCategory::Education, EDUCATION_APPS),
];

/// Built-in classification. Total: unknown identifiers are `Other`.
pub fn classify(package_name: &str) -> AppCategory {
    CATEGORY_TABLES
        .iter()
        .find(|(_, members)| members.contains(&package_name))
        .map(|(category, _)| *category)
        .unwrap_or(AppCategory::Other)
}

/// User overrides loaded from `categories.json`, keyed by lower-cased
/// package or application name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryRules {
    #[serde(default)]
    pub apps: HashMap<String, String>,
}

impl CategoryRules {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read categories file: {}", path.display()))?;
        let parsed: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse categories file: {}", path.display()))?;

        Ok(parsed.normalized())
    }

    /// Loads the overrides, falling back to the built-in tables alone when
    /// the file is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(rules) => rules,
            Err(error) => {
                tracing::warn!(error = %error, "Using built-in categories only");
                Self::default()
            }
        }
    }

    pub fn categorize(&self, package_name: &str) -> AppCategory {
        self.override_for(package_name)
            .unwrap_or_else(|| classify(package_name))
    }

    fn override_for(&self, package_name: &str) -> Option<AppCategory> {
        let normalized = package_name.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        self.apps
            .get(&normalized)
            .or_else(|| {
                // Longest key wins so "code" does not shadow "vscode".
                self.apps
                    .iter()
                    .filter(|(key, _)| normalized.contains(key.as_str()))
                    .max_by_key(|(key, _)| key.len())
                    .map(|(_, value)| value)
            })
            .map(|value| AppCategory::normalize(value))
    }

    fn normalized(self) -> Self {
        let apps = self
            .apps
            .into_iter()
            .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_lowercase()))
            .filter(|(key, _)| !key.is_empty())
            .collect::<HashMap<_, _>>();

        Self { apps }
    }
}

#[cfg(test)]
mod tests {
    use super::{CATEGORY_TABLES, CategoryRules, classify};
    use crate::models::AppCategory;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn built_in_tables_are_disjoint() {
        let mut seen = HashSet::new();
        for (category, members) in CATEGORY_TABLES {
            for member in *members {
                assert!(seen.insert(*member), "{member} listed twice (again under {category})");
            }
        }
    }

    #[test]
    fn classify_known_and_unknown_packages() {
        assert_eq!(classify("com.instagram.android"), AppCategory::SocialMedia);
        assert_eq!(classify("com.todoist"), AppCategory::Productivity);
        assert_eq!(classify("com.spotify.music"), AppCategory::Entertainment);
        assert_eq!(classify("com.mojang.minecraftpe"), AppCategory::Gaming);
        assert_eq!(classify("org.telegram.messenger"), AppCategory::Communication);
        assert_eq!(classify("com.duolingo"), AppCategory::Education);
        assert_eq!(classify("com.unknown.app"), AppCategory::Other);
        assert_eq!(classify(""), AppCategory::Other);
    }

    #[test]
    fn overrides_take_precedence_over_tables() {
        let rules = CategoryRules {
            apps: HashMap::from([
                ("com.spotify.music".to_string(), "productivity".to_string()),
                ("code".to_string(), "development".to_string()),
                ("vscode".to_string(), "games".to_string()),
                ("odd".to_string(), "not-a-category".to_string()),
            ]),
        }
        .normalized();

        assert_eq!(rules.categorize("com.spotify.music"), AppCategory::Productivity);
        assert_eq!(rules.categorize("Visual Studio Code"), AppCategory::Productivity);
        assert_eq!(rules.categorize("VSCode Insiders"), AppCategory::Gaming);
        assert_eq!(rules.categorize("Oddity"), AppCategory::Other);
        assert_eq!(rules.categorize("com.whatsapp"), AppCategory::SocialMedia);
    }

    #[test]
    fn load_reads_override_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("categories.json");
        std::fs::write(&path, r#"{"apps":{" Slack ":"chat"}}"#).expect("write rules");

        let rules = CategoryRules::load(&path).expect("load rules");
        assert_eq!(rules.categorize("slack"), AppCategory::Communication);

        let fallback = CategoryRules::load_or_default(&dir.path().join("missing.json"));
        assert!(fallback.apps.is_empty());
    }
}
