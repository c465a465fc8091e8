/*
 *  Copyright 2025-2026 Runnerd Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Skill manifest loading: reads the front-matter block of
//! `.claude/skills/*.md` files without interpreting the Markdown body.
//!
//! The front-matter is a restricted subset of YAML (flat `key: value`
//! pairs and one-level `key: [a, b, c]` lists), so it is parsed by hand
//! rather than pulling in a YAML dependency for five scalar fields.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::task::TaskType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillManifest {
    pub skill: String,
    pub category: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub color_tag: Option<String>,
    pub task_types: Vec<TaskType>,
    pub source_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("missing required front-matter field: {0}")]
    MissingField(&'static str),
    #[error("front-matter block is not terminated with a closing `---`")]
    UnterminatedFrontMatter,
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Extracts the `---`-delimited front-matter block at the top of a
/// skill file, if present.
fn extract_front_matter(content: &str) -> Option<&str> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;
    let end = rest.find("\n---").or_else(|| rest.find("\r\n---"))?;
    Some(&rest[..end])
}

/// Parses flat `key: value` and `key: [a, b, c]` lines. Comments (`#`) and
/// blank lines are skipped; nested mappings are not supported because no
/// skill field needs them.
fn parse_front_matter_lines(block: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in block.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            pairs.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    pairs
}

fn parse_list(value: &str) -> Vec<String> {
    let inner = value.trim().trim_start_matches('[').trim_end_matches(']');
    inner
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn unquote(value: &str) -> String {
    value.trim_matches('"').trim_matches('\'').to_string()
}

pub fn parse_skill_content(content: &str, source_path: PathBuf) -> Result<SkillManifest, SkillError> {
    let block = extract_front_matter(content).ok_or(SkillError::UnterminatedFrontMatter)?;
    let pairs = parse_front_matter_lines(block);

    let mut skill = None;
    let mut category = None;
    let mut risk_level = None;
    let mut color_tag = None;
    let mut task_types = Vec::new();

    for (key, value) in pairs {
        match key.as_str() {
            "skill" => skill = Some(unquote(&value)),
            "category" => category = Some(unquote(&value)),
            "risk_level" => risk_level = RiskLevel::parse(&unquote(&value)),
            "color_tag" => color_tag = Some(unquote(&value)),
            "task_types" => {
                task_types = parse_list(&value)
                    .iter()
                    .map(|s| TaskType::parse(&s.to_ascii_uppercase().replace('-', "_")))
                    .collect();
            }
            _ => {}
        }
    }

    Ok(SkillManifest {
        skill: skill.ok_or(SkillError::MissingField("skill"))?,
        category,
        risk_level,
        color_tag,
        task_types,
        source_path,
    })
}

pub fn load_skill_file(path: &Path) -> Result<SkillManifest, SkillError> {
    let content = fs::read_to_string(path).map_err(|source| SkillError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_skill_content(&content, path.to_path_buf())
}

/// Loads every `*.md` file directly under `skills_dir`, skipping ones
/// without a parseable front-matter block rather than failing the batch.
pub fn load_skills_dir(skills_dir: &Path) -> Vec<SkillManifest> {
    let Ok(entries) = fs::read_dir(skills_dir) else {
        return Vec::new();
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("md"))
        .filter_map(|path| load_skill_file(&path).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"---
skill: code-review
category: quality
risk_level: medium
color_tag: blue
task_types: [implementation, report]
---

# Code Review

Review the diff for correctness.
"#;

    #[test]
    fn parses_full_front_matter() {
        let manifest = parse_skill_content(SAMPLE, PathBuf::from("code-review.md")).unwrap();
        assert_eq!(manifest.skill, "code-review");
        assert_eq!(manifest.category.as_deref(), Some("quality"));
        assert_eq!(manifest.risk_level, Some(RiskLevel::Medium));
        assert_eq!(manifest.task_types.len(), 2);
    }

    #[test]
    fn missing_skill_field_errors() {
        let content = "---\ncategory: quality\n---\nbody\n";
        let err = parse_skill_content(content, PathBuf::from("x.md")).unwrap_err();
        assert!(matches!(err, SkillError::MissingField("skill")));
    }

    #[test]
    fn missing_closing_delimiter_errors() {
        let content = "---\nskill: x\nbody without a terminator\n";
        let err = parse_skill_content(content, PathBuf::from("x.md")).unwrap_err();
        assert!(matches!(err, SkillError::UnterminatedFrontMatter));
    }

    #[test]
    fn body_is_never_interpreted() {
        let manifest = parse_skill_content(SAMPLE, PathBuf::from("x.md")).unwrap();
        // Only front-matter fields populate the manifest; markdown body is ignored.
        assert_eq!(manifest.color_tag.as_deref(), Some("blue"));
    }
}
