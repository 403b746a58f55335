use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::text::{dedup_terms, normalize};

/// Semantic category of a resume section. Drives rendering order and headings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    Skills,
    Experience,
    Education,
    Projects,
    Certifications,
    #[default]
    Other,
}

/// Body of a section: free-text bullets or a skill set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "items", rename_all = "snake_case")]
pub enum SectionContent {
    Bullets(Vec<String>),
    Skills(#[serde(deserialize_with = "deserialize_skill_set")] Vec<String>),
}

/// Skill sets arriving over the wire get the same collapsing as `Section::skills`.
fn deserialize_skill_set<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer).map(dedup_terms)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Stable identifier used by bullet references and change records.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub kind: SectionKind,
    pub content: SectionContent,
}

impl Section {
    pub fn bullets(id: &str, title: &str, kind: SectionKind, bullets: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            kind,
            content: SectionContent::Bullets(bullets),
        }
    }

    /// Builds a skill section; duplicate skills (case-insensitive) are collapsed.
    pub fn skills(id: &str, title: &str, skills: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            kind: SectionKind::Skills,
            content: SectionContent::Skills(dedup_terms(skills)),
        }
    }

    pub fn bullet_items(&self) -> &[String] {
        match &self.content {
            SectionContent::Bullets(items) => items,
            SectionContent::Skills(_) => &[],
        }
    }

    pub fn skill_items(&self) -> &[String] {
        match &self.content {
            SectionContent::Skills(items) => items,
            SectionContent::Bullets(_) => &[],
        }
    }

    pub fn is_skill_set(&self) -> bool {
        matches!(self.content, SectionContent::Skills(_))
    }
}

/// Location of a single bullet: section id plus zero-based index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BulletRef {
    pub section_id: String,
    pub index: usize,
}

impl BulletRef {
    pub fn new(section_id: &str, index: usize) -> Self {
        Self {
            section_id: section_id.to_string(),
            index,
        }
    }
}

impl fmt::Display for BulletRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.section_id, self.index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub website: Option<String>,
}

/// A structured resume as supplied by ingestion.
///
/// Values are snapshots: the alignment loop clones before revising, so every
/// iteration's resume stays inspectable. `Clone` shares nothing with the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resume {
    pub full_name: String,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Resume {
    pub fn new(full_name: &str, sections: Vec<Section>) -> Self {
        Self {
            full_name: full_name.to_string(),
            contact: ContactInfo::default(),
            sections,
        }
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    /// All bullets in document order, with their references.
    pub fn bullets(&self) -> impl Iterator<Item = (BulletRef, &str)> + '_ {
        self.sections.iter().flat_map(|section| {
            section
                .bullet_items()
                .iter()
                .enumerate()
                .map(move |(i, text)| (BulletRef::new(&section.id, i), text.as_str()))
        })
    }

    pub fn bullet(&self, bullet_ref: &BulletRef) -> Option<&str> {
        self.section(&bullet_ref.section_id)?
            .bullet_items()
            .get(bullet_ref.index)
            .map(String::as_str)
    }

    pub fn bullet_count(&self) -> usize {
        self.sections.iter().map(|s| s.bullet_items().len()).sum()
    }

    /// Every skill entry across all skill sections.
    pub fn skills(&self) -> impl Iterator<Item = &str> + '_ {
        self.sections
            .iter()
            .flat_map(|s| s.skill_items().iter().map(String::as_str))
    }

    /// Normalized text of every bullet and skill entry, for keyword matching.
    pub fn normalized_texts(&self) -> Vec<String> {
        self.bullets()
            .map(|(_, text)| text)
            .chain(self.skills())
            .map(normalize)
            .collect()
    }

    /// (section id, bullet count) per section. Rewrites must leave this unchanged.
    pub fn shape(&self) -> Vec<(&str, usize)> {
        self.sections
            .iter()
            .map(|s| (s.id.as_str(), s.bullet_items().len()))
            .collect()
    }

    /// Replaces one bullet, returning the previous text. `None` if the bullet does not exist.
    pub fn replace_bullet(&mut self, bullet_ref: &BulletRef, text: String) -> Option<String> {
        let section = self
            .sections
            .iter_mut()
            .find(|s| s.id == bullet_ref.section_id)?;
        match &mut section.content {
            SectionContent::Bullets(items) => items
                .get_mut(bullet_ref.index)
                .map(|slot| std::mem::replace(slot, text)),
            SectionContent::Skills(_) => None,
        }
    }

    /// Appends skills to a skill section, skipping ones already present.
    /// Returns the skills actually added, or `None` if the section is not a skill set.
    pub fn add_skills(&mut self, section_id: &str, skills: &[String]) -> Option<Vec<String>> {
        let section = self.sections.iter_mut().find(|s| s.id == section_id)?;
        let SectionContent::Skills(items) = &mut section.content else {
            return None;
        };

        let mut added = Vec::new();
        for skill in dedup_terms(skills) {
            let key = normalize(&skill);
            if items.iter().any(|existing| normalize(existing) == key) {
                continue;
            }
            items.push(skill.clone());
            added.push(skill);
        }
        Some(added)
    }
}
