//! Seed manifest: the declarative description of what to seed.
//!
//! ```json
//! { "users": [ { "telegram_id": 3003, "username": "owner",
//!   "projects": [ { "name": "X", "description": "Downtown courts",
//!     "competitors": [ "ace.padel", "https://instagram.com/bandeja/" ] } ] } ] }
//! ```
//!
//! [`SeedManifest::compile`] turns it into a [`SeedPlan`]. Project names are
//! validated and competitor entries go through the Instagram username parser,
//! so `@handle`, `handle` and a profile URL all land on the same natural key.
//! Entries that normalize to the same key collapse into one step; the first
//! occurrence's payload is kept.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use clubseed_core::validate::{
    instagram_profile_url, parse_instagram_username, validate_project_name,
};
use clubseed_core::{DomainError, Values};

use super::plan::{SeedPlan, Slot};
use crate::reconcile::ReconcileError;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest is not valid JSON")]
    Parse(#[from] serde_json::Error),

    #[error("invalid manifest entry at {at}")]
    Invalid {
        at: String,
        #[source]
        source: DomainError,
    },

    #[error("manifest could not be planned")]
    Plan(#[from] ReconcileError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedManifest {
    #[serde(default)]
    pub users: Vec<UserSeed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSeed {
    pub telegram_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub is_premium: Option<bool>,
    #[serde(default)]
    pub projects: Vec<ProjectSeed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSeed {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Instagram handles or profile URLs.
    #[serde(default)]
    pub competitors: Vec<String>,
}

fn default_active() -> bool {
    true
}

impl SeedManifest {
    pub fn from_json_str(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let json = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Normalize and order the manifest into a seed plan.
    pub fn compile(&self) -> Result<SeedPlan, ManifestError> {
        let mut plan = SeedPlan::new();
        let mut users: HashMap<i64, Slot> = HashMap::new();
        let mut projects: HashMap<(Slot, String), Slot> = HashMap::new();
        let mut competitors: HashMap<(Slot, String), Slot> = HashMap::new();

        for (u, user) in self.users.iter().enumerate() {
            let owner = *users
                .entry(user.telegram_id)
                .or_insert_with(|| plan.user(user.telegram_id, user.payload()));

            for (p, project) in user.projects.iter().enumerate() {
                let at = format!("users[{u}].projects[{p}]");
                let name = validate_project_name(&project.name).map_err(|source| {
                    ManifestError::Invalid {
                        at: format!("{at}.name"),
                        source,
                    }
                })?;

                let project_slot = match projects.get(&(owner, name.clone())) {
                    Some(slot) => *slot,
                    None => {
                        let slot = plan.project(owner, name.clone(), project.payload())?;
                        projects.insert((owner, name), slot);
                        slot
                    }
                };

                for (c, entry) in project.competitors.iter().enumerate() {
                    let username = parse_instagram_username(entry).map_err(|source| {
                        ManifestError::Invalid {
                            at: format!("{at}.competitors[{c}]"),
                            source,
                        }
                    })?;
                    if competitors.contains_key(&(project_slot, username.clone())) {
                        continue;
                    }
                    let payload = Values::new()
                        .with("instagram_url", instagram_profile_url(&username))
                        .with("is_active", true);
                    let slot = plan.competitor(project_slot, username.clone(), payload)?;
                    competitors.insert((project_slot, username), slot);
                }
            }
        }

        Ok(plan)
    }
}

impl UserSeed {
    fn payload(&self) -> Values {
        let mut values = Values::new();
        let text = [
            ("username", &self.username),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("language_code", &self.language_code),
        ];
        for (column, value) in text {
            if let Some(value) = value {
                values.set(column, value.as_str());
            }
        }
        if let Some(premium) = self.is_premium {
            values.set("is_premium", premium);
        }
        values
    }
}

impl ProjectSeed {
    fn payload(&self) -> Values {
        let mut values = Values::new().with("is_active", self.is_active);
        if let Some(description) = &self.description {
            values.set("description", description.as_str());
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubseed_core::{EntityKind, Scalar};

    const MANIFEST: &str = r#"{
        "users": [{
            "telegram_id": 3003,
            "username": "club_owner",
            "first_name": "Ana",
            "projects": [{
                "name": "  X  ",
                "description": "Downtown courts",
                "competitors": [
                    "ace.padel",
                    "@Ace.Padel",
                    "https://www.instagram.com/bandeja/?hl=es",
                    "instagram.com/chiquita"
                ]
            }]
        }]
    }"#;

    #[test]
    fn compiles_in_dependency_order() {
        let plan = SeedManifest::from_json_str(MANIFEST).unwrap().compile().unwrap();

        let kinds: Vec<_> = plan.steps().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EntityKind::User,
                EntityKind::Project,
                EntityKind::Competitor,
                EntityKind::Competitor,
                EntityKind::Competitor,
            ]
        );

        let user = &plan.steps()[0];
        assert_eq!(user.key.fields(), &[Scalar::Int(3003)]);
        assert_eq!(user.payload.get("first_name"), Some(&Scalar::from("Ana")));
        assert!(!user.payload.contains("last_name"));

        let project = &plan.steps()[1];
        assert_eq!(project.key.fields(), &[Scalar::from("X")]);
        assert_eq!(project.payload.get("is_active"), Some(&Scalar::Bool(true)));
    }

    #[test]
    fn handles_and_urls_collapse_to_one_competitor() {
        let plan = SeedManifest::from_json_str(MANIFEST).unwrap().compile().unwrap();

        let usernames: Vec<_> = plan
            .steps()
            .iter()
            .filter(|s| s.kind == EntityKind::Competitor)
            .map(|s| s.key.fields()[0].as_text().unwrap_or_default().to_string())
            .collect();
        assert_eq!(usernames, vec!["ace.padel", "bandeja", "chiquita"]);

        let bandeja = &plan.steps()[3];
        assert_eq!(
            bandeja.payload.get("instagram_url"),
            Some(&Scalar::from("https://www.instagram.com/bandeja/"))
        );
    }

    #[test]
    fn repeated_users_and_projects_share_a_slot() {
        let json = r#"{ "users": [
            { "telegram_id": 1, "projects": [ { "name": "X", "competitors": ["a"] } ] },
            { "telegram_id": 1, "projects": [ { "name": "X", "competitors": ["a", "b"] } ] }
        ] }"#;
        let plan = SeedManifest::from_json_str(json).unwrap().compile().unwrap();

        assert_eq!(plan.count(EntityKind::User), 1);
        assert_eq!(plan.count(EntityKind::Project), 1);
        assert_eq!(plan.count(EntityKind::Competitor), 2);
    }

    #[test]
    fn same_project_name_under_two_users_is_two_projects() {
        let json = r#"{ "users": [
            { "telegram_id": 1, "projects": [ { "name": "X" } ] },
            { "telegram_id": 2, "projects": [ { "name": "X" } ] }
        ] }"#;
        let plan = SeedManifest::from_json_str(json).unwrap().compile().unwrap();
        assert_eq!(plan.count(EntityKind::Project), 2);
    }

    #[test]
    fn bad_entries_name_their_location() {
        let json = r#"{ "users": [ { "telegram_id": 1, "projects": [
            { "name": "X", "competitors": ["ok", "https://example.com/nope"] }
        ] } ] }"#;
        let err = SeedManifest::from_json_str(json).unwrap().compile().unwrap_err();
        match err {
            ManifestError::Invalid { at, .. } => {
                assert_eq!(at, "users[0].projects[0].competitors[1]");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let json = r#"{ "users": [ { "telegram_id": 1, "projects": [ { "name": "   " } ] } ] }"#;
        let err = SeedManifest::from_json_str(json).unwrap().compile().unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { ref at, .. } if at == "users[0].projects[0].name"));
    }

    #[test]
    fn unknown_fields_and_bad_json_are_parse_errors() {
        assert!(matches!(
            SeedManifest::from_json_str(r#"{ "users": [ { "telegram_id": 1, "court": "A" } ] }"#),
            Err(ManifestError::Parse(_))
        ));
        assert!(matches!(
            SeedManifest::from_json_str("{ users"),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SeedManifest::from_path(Path::new("/nonexistent/clubseed.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }

    #[test]
    fn empty_manifest_is_an_empty_plan() {
        let plan = SeedManifest::from_json_str("{}").unwrap().compile().unwrap();
        assert!(plan.is_empty());
    }
}
