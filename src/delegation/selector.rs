use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An external collaborator service a task can be delegated to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationCandidate {
    pub id: String,
    pub name: String,
    /// Specialty keywords, in priority order.
    pub specialties: Vec<String>,
    pub url: String,
}

impl DelegationCandidate {
    pub fn new(id: &str, name: &str, specialties: &[&str], url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            specialties: specialties.iter().map(|s| s.to_string()).collect(),
            url: url.to_string(),
        }
    }
}

/// A unit of work to hand off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl Task {
    pub fn new(description: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            task_type: task_type.into(),
            ..Default::default()
        }
    }
}

/// The built-in catalog of collaborator services.
pub fn default_catalog() -> Vec<DelegationCandidate> {
    vec![
        DelegationCandidate::new(
            "bolt",
            "bolt.new",
            &["full-stack", "rapid-prototyping", "web-apps", "react", "vue", "nodejs"],
            "https://bolt.new",
        ),
        DelegationCandidate::new(
            "lovable",
            "lovable.dev",
            &["ui-design", "frontend", "react", "tailwind", "responsive-design"],
            "https://lovable.dev",
        ),
        DelegationCandidate::new(
            "v0",
            "v0.dev",
            &["ui-components", "nextjs", "shadcn", "component-library"],
            "https://v0.dev",
        ),
        DelegationCandidate::new(
            "cursor",
            "cursor.sh",
            &["code-editing", "refactoring", "bug-fixing", "code-review"],
            "https://cursor.sh",
        ),
    ]
}

/// Scores how well a candidate fits a task. Higher is better.
pub trait Scorer: Send + Sync {
    fn score(&self, task: &Task, candidate: &DelegationCandidate) -> usize;

    /// Keywords that contributed to the score, for human-readable reasoning.
    fn matched(&self, _task: &Task, _candidate: &DelegationCandidate) -> Vec<String> {
        Vec::new()
    }
}

impl<S: Scorer + ?Sized> Scorer for Box<S> {
    fn score(&self, task: &Task, candidate: &DelegationCandidate) -> usize {
        (**self).score(task, candidate)
    }

    fn matched(&self, task: &Task, candidate: &DelegationCandidate) -> Vec<String> {
        (**self).matched(task, candidate)
    }
}

/// Counts specialty keywords that occur as substrings of the task text.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    /// Lowercased type, description and requirements joined by spaces.
    pub fn keyword_bag(task: &Task) -> String {
        let mut parts = vec![task.task_type.to_lowercase(), task.description.to_lowercase()];
        parts.extend(task.requirements.iter().map(|r| r.to_lowercase()));
        parts.join(" ")
    }
}

impl Scorer for KeywordScorer {
    fn score(&self, task: &Task, candidate: &DelegationCandidate) -> usize {
        self.matched(task, candidate).len()
    }

    fn matched(&self, task: &Task, candidate: &DelegationCandidate) -> Vec<String> {
        let bag = Self::keyword_bag(task);
        candidate
            .specialties
            .iter()
            .map(|s| s.to_lowercase())
            .filter(|s| !s.is_empty() && bag.contains(s.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a DelegationCandidate,
    pub score: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub recommended: DelegationCandidate,
    pub score: usize,
    pub alternatives: Vec<DelegationCandidate>,
    pub reasoning: String,
}

/// Picks the best collaborator for a task.
///
/// Selection is a stable scan: the first candidate with the highest score
/// wins, so equal scores resolve to catalog order. A zero score still wins
/// when nothing matches; callers that need "no good match" check `score`.
#[derive(Debug, Clone, Default)]
pub struct DelegationSelector<S = KeywordScorer> {
    scorer: S,
}

impl DelegationSelector<KeywordScorer> {
    pub fn new() -> Self {
        Self {
            scorer: KeywordScorer,
        }
    }
}

impl<S: Scorer> DelegationSelector<S> {
    pub fn with_scorer(scorer: S) -> Self {
        Self { scorer }
    }

    pub fn select_best<'a>(
        &self,
        task: &Task,
        catalog: &'a [DelegationCandidate],
    ) -> Option<ScoredCandidate<'a>> {
        let mut best: Option<ScoredCandidate<'a>> = None;
        for candidate in catalog {
            let score = self.scorer.score(task, candidate);
            match best {
                Some(current) if score <= current.score => {}
                _ => best = Some(ScoredCandidate { candidate, score }),
            }
        }
        best
    }

    /// All candidates, highest score first; ties keep catalog order.
    pub fn rank<'a>(&self, task: &Task, catalog: &'a [DelegationCandidate]) -> Vec<ScoredCandidate<'a>> {
        let mut ranked: Vec<ScoredCandidate<'a>> = catalog
            .iter()
            .map(|candidate| ScoredCandidate {
                candidate,
                score: self.scorer.score(task, candidate),
            })
            .collect();
        // sort_by is stable.
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    /// Best candidate, up to two runners-up, and the reasoning.
    pub fn recommend(&self, task: &Task, catalog: &[DelegationCandidate]) -> Option<Recommendation> {
        let best = self.select_best(task, catalog)?;
        let alternatives = self
            .rank(task, catalog)
            .into_iter()
            .filter(|scored| scored.candidate.id != best.candidate.id)
            .take(2)
            .map(|scored| scored.candidate.clone())
            .collect();
        let reasoning = self.reasoning(task, best.candidate);

        Some(Recommendation {
            recommended: best.candidate.clone(),
            score: best.score,
            alternatives,
            reasoning,
        })
    }

    fn reasoning(&self, task: &Task, candidate: &DelegationCandidate) -> String {
        let matched = self.scorer.matched(task, candidate);
        let areas = if matched.is_empty() {
            "the required areas".to_string()
        } else {
            matched.join(", ")
        };
        format!(
            "{} is recommended because it specializes in {areas}. This service is ideal for {} tasks.",
            candidate.name, task.task_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<DelegationCandidate> {
        vec![
            DelegationCandidate::new("backend", "Backend Co", &["database", "api"], "https://b"),
            DelegationCandidate::new("ui", "UI Co", &["frontend", "css"], "https://u"),
            DelegationCandidate::new("ops", "Ops Co", &["deploy", "kubernetes"], "https://o"),
        ]
    }

    #[test]
    fn frontend_task_picks_frontend_specialist() {
        let task = Task::new("build a react dashboard", "frontend");
        let catalog = catalog();
        let best = DelegationSelector::new().select_best(&task, &catalog).unwrap();
        assert_eq!(best.candidate.id, "ui");
        assert_eq!(best.score, 1);
    }

    #[test]
    fn zero_score_still_returns_first_candidate() {
        let task = Task::new("write a poem", "creative");
        let catalog = catalog();
        let best = DelegationSelector::new().select_best(&task, &catalog).unwrap();
        assert_eq!(best.candidate.id, "backend");
        assert_eq!(best.score, 0);
    }

    #[test]
    fn empty_catalog_selects_nothing() {
        let task = Task::new("anything", "any");
        assert!(DelegationSelector::new().select_best(&task, &[]).is_none());
        assert!(DelegationSelector::new().recommend(&task, &[]).is_none());
    }

    #[test]
    fn ties_resolve_to_catalog_order() {
        let task = Task::new("an api with some css", "mixed");
        let selector = DelegationSelector::new();
        let catalog = catalog();
        for _ in 0..10 {
            let best = selector.select_best(&task, &catalog).unwrap();
            assert_eq!(best.candidate.id, "backend");
        }
    }

    #[test]
    fn requirements_contribute_to_the_bag() {
        let mut task = Task::new("ship it", "infra");
        task.requirements = vec!["Deploy to Kubernetes".into()];
        let catalog = catalog();
        let best = DelegationSelector::new().select_best(&task, &catalog).unwrap();
        assert_eq!(best.candidate.id, "ops");
        assert_eq!(best.score, 2);
    }

    #[test]
    fn substring_matching_counts_partial_words() {
        // "apis" contains "api"
        let task = Task::new("several apis", "misc");
        assert_eq!(KeywordScorer.score(&task, &catalog()[0]), 1);
    }

    #[test]
    fn default_catalog_prefers_lovable_for_react_frontend() {
        let task = Task::new("build a react dashboard", "frontend");
        let catalog = default_catalog();
        let best = DelegationSelector::new()
            .select_best(&task, &catalog)
            .unwrap();
        // bolt matches "react" only; lovable matches "frontend" and "react".
        assert_eq!(best.candidate.id, "lovable");
        assert_eq!(best.score, 2);
    }

    #[test]
    fn recommend_names_overlapping_keywords() {
        let task = Task::new("build a react dashboard", "frontend");
        let rec = DelegationSelector::new()
            .recommend(&task, &default_catalog())
            .unwrap();
        assert_eq!(rec.recommended.id, "lovable");
        assert_eq!(
            rec.reasoning,
            "lovable.dev is recommended because it specializes in frontend, react. \
             This service is ideal for frontend tasks."
        );
        let alt_ids: Vec<&str> = rec.alternatives.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(alt_ids, vec!["bolt", "v0"]);
    }

    #[test]
    fn recommend_without_matches_uses_generic_reasoning() {
        let task = Task::new("write a poem", "creative");
        let rec = DelegationSelector::new().recommend(&task, &catalog()).unwrap();
        assert_eq!(rec.score, 0);
        assert!(rec.reasoning.contains("the required areas"));
        assert_eq!(rec.alternatives.len(), 2);
    }

    struct PreferLast;

    impl Scorer for PreferLast {
        fn score(&self, _task: &Task, candidate: &DelegationCandidate) -> usize {
            if candidate.id == "ops" { 5 } else { 0 }
        }
    }

    #[test]
    fn scorer_is_pluggable() {
        let task = Task::new("build a react dashboard", "frontend");
        let catalog = catalog();
        let best = DelegationSelector::with_scorer(PreferLast)
            .select_best(&task, &catalog)
            .unwrap();
        assert_eq!(best.candidate.id, "ops");
    }

    #[test]
    fn task_deserializes_type_field() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "description": "build a react dashboard",
            "type": "frontend",
        }))
        .unwrap();
        assert_eq!(task.task_type, "frontend");
        assert!(task.requirements.is_empty());
        assert!(task.title.is_none());
    }
}
