//! Statistics service
//!
//! Derived views over one user's entries and files: counters, mood and
//! activity breakdowns, streaks, the productivity score and achievements.
//! Every call takes a fresh snapshot of the document; nothing is cached.

use crate::config;
use crate::database::repository::entries_for;
use crate::database::{Document, Element, ElementType, Entry, EntryElement, File, Repository, User};
use crate::error::{AppError, Result};
use crate::storage::usage::{format_size, round1, usage_bytes};
use crate::storage::AvatarStore;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Counters shown on the profile page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicStats {
    pub total_entries: usize,
    pub total_files: usize,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub task_completion_rate: f64,
    /// Formatted storage footprint, e.g. "1.5 KB"
    pub storage_used: String,
    /// Whole days since the account was created
    pub account_age: i64,
    pub last_active: String,
}

/// Element counts per recognized type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntriesByType {
    pub text: usize,
    pub checklist: usize,
    pub highlight: usize,
    pub problem: usize,
    pub achievement: usize,
}

impl EntriesByType {
    pub fn get(&self, kind: ElementType) -> usize {
        match kind {
            ElementType::Text => self.text,
            ElementType::Checklist => self.checklist,
            ElementType::Highlight => self.highlight,
            ElementType::Problem => self.problem,
            ElementType::Achievement => self.achievement,
        }
    }

    fn bump(&mut self, kind: ElementType) {
        match kind {
            ElementType::Text => self.text += 1,
            ElementType::Checklist => self.checklist += 1,
            ElementType::Highlight => self.highlight += 1,
            ElementType::Problem => self.problem += 1,
            ElementType::Achievement => self.achievement += 1,
        }
    }

    /// Number of types used at least once
    pub fn nonzero_types(&self) -> usize {
        ElementType::ALL
            .iter()
            .filter(|kind| self.get(**kind) > 0)
            .count()
    }
}

/// Inputs of the productivity score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreInputs {
    pub completed_tasks: usize,
    pub active_days: usize,
    pub file_count: usize,
    pub nonzero_types: usize,
    pub problem_count: usize,
}

impl ScoreInputs {
    /// Additive 0-100 score; each term is capped before summing.
    pub fn score(&self) -> u32 {
        let term = |count: usize, weight: usize, cap: usize| count.saturating_mul(weight).min(cap);

        let total = term(self.completed_tasks, 3, 30)
            + term(self.active_days, 5, 20)
            + term(self.file_count, 7, 20)
            + term(self.nonzero_types, 3, 15)
            + term(self.problem_count, 3, 15);

        total.min(100) as u32
    }
}

/// An unlocked badge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Clone, Copy)]
enum Metric {
    Entries,
    CompletedTasks,
    ProblemElements,
    AchievementElements,
    Files,
}

struct AchievementRule {
    metric: Metric,
    threshold: usize,
    badge: Achievement,
}

const ACHIEVEMENT_CATALOG: [AchievementRule; 6] = [
    AchievementRule {
        metric: Metric::Entries,
        threshold: 10,
        badge: Achievement {
            id: "entry_10",
            name: "Active Writer",
            description: "Added 10 entries",
            icon: "📝",
            color: "#9d4edd",
        },
    },
    AchievementRule {
        metric: Metric::Entries,
        threshold: 50,
        badge: Achievement {
            id: "entry_50",
            name: "Seasoned Writer",
            description: "Added 50 entries",
            icon: "✍️",
            color: "#c77dff",
        },
    },
    AchievementRule {
        metric: Metric::CompletedTasks,
        threshold: 20,
        badge: Achievement {
            id: "task_20",
            name: "Task Finisher",
            description: "Completed 20 tasks",
            icon: "✅",
            color: "#00b8a9",
        },
    },
    AchievementRule {
        metric: Metric::ProblemElements,
        threshold: 5,
        badge: Achievement {
            id: "problem_solver",
            name: "Problem Solver",
            description: "Recorded 5 problems with their solutions",
            icon: "⚠️",
            color: "#f85f5f",
        },
    },
    AchievementRule {
        metric: Metric::AchievementElements,
        threshold: 10,
        badge: Achievement {
            id: "achiever",
            name: "Achiever",
            description: "Recorded 10 achievements",
            icon: "🏆",
            color: "#ff9e00",
        },
    },
    AchievementRule {
        metric: Metric::Files,
        threshold: 3,
        badge: Achievement {
            id: "organized",
            name: "Organized",
            description: "Created 3 different files",
            icon: "📁",
            color: "#7b2cbf",
        },
    },
];

/// Qualitative band of the productivity score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProductivityLevel {
    #[serde(rename = "excellent")]
    Excellent,
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "average")]
    Average,
    #[serde(rename = "needs improvement")]
    NeedsImprovement,
}

impl ProductivityLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            80.. => ProductivityLevel::Excellent,
            60..=79 => ProductivityLevel::Good,
            40..=59 => ProductivityLevel::Average,
            _ => ProductivityLevel::NeedsImprovement,
        }
    }
}

/// Score with its narrative
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductivityAnalysis {
    pub score: u32,
    pub level: ProductivityLevel,
    pub strengths: Vec<&'static str>,
    pub weaknesses: Vec<&'static str>,
}

/// What the stats page loads in one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsOverview {
    pub basic: BasicStats,
    pub mood_distribution: BTreeMap<String, usize>,
    pub entries_by_type: EntriesByType,
    pub productivity_score: u32,
}

/// Statistics over one snapshot of a user's data
#[derive(Debug, Clone)]
pub struct Stats {
    user: Option<User>,
    entries: Vec<Entry>,
    files: Vec<File>,
    storage_used: u64,
    now: DateTime<Utc>,
}

impl Stats {
    pub fn new(user: Option<User>, entries: Vec<Entry>, files: Vec<File>, now: DateTime<Utc>) -> Self {
        Self {
            user,
            entries,
            files,
            storage_used: 0,
            now,
        }
    }

    /// Attach the user's storage footprint in bytes
    pub fn with_storage_used(mut self, bytes: u64) -> Self {
        self.storage_used = bytes;
        self
    }

    /// Pick one user's records out of a document snapshot
    pub fn from_document(document: &Document, user_id: &str, now: DateTime<Utc>) -> Self {
        let user = document.users.iter().find(|u| u.id == user_id).cloned();
        let entries = entries_for(document, user_id, None);
        let files = document
            .files
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();

        Self::new(user, entries, files, now)
    }

    pub fn basic_stats(&self) -> BasicStats {
        BasicStats {
            total_entries: self.entries.len(),
            total_files: self.files.len(),
            total_tasks: self.total_tasks(),
            completed_tasks: self.completed_tasks(),
            task_completion_rate: self.completion_rate(),
            storage_used: format_size(self.storage_used),
            account_age: self.account_age(),
            last_active: self.last_active(),
        }
    }

    fn elements(&self) -> impl Iterator<Item = &Element> {
        self.entries
            .iter()
            .flat_map(|entry| entry.elements.iter())
            .filter_map(|element| match element {
                EntryElement::Typed(element) => Some(element),
                EntryElement::Untyped(_) => None,
            })
    }

    fn checklist_items(&self) -> impl Iterator<Item = &crate::database::ChecklistItem> {
        self.elements().flat_map(|element| match element {
            Element::Checklist { items } => items.as_slice(),
            Element::Text { .. }
            | Element::Highlight { .. }
            | Element::Problem { .. }
            | Element::Achievement { .. } => &[],
        })
    }

    pub fn total_tasks(&self) -> usize {
        self.checklist_items().count()
    }

    pub fn completed_tasks(&self) -> usize {
        self.checklist_items().filter(|item| item.checked).count()
    }

    /// Percentage of checked items, one decimal; 0 when there are no items
    pub fn completion_rate(&self) -> f64 {
        let total = self.total_tasks();
        if total == 0 {
            return 0.0;
        }
        round1(self.completed_tasks() as f64 / total as f64 * 100.0)
    }

    pub fn account_age(&self) -> i64 {
        match &self.user {
            Some(user) => (self.now - user.created_at).num_days().max(0),
            None => 0,
        }
    }

    pub fn last_active(&self) -> String {
        let Some(last) = self.entries.iter().map(|e| e.created_at).max() else {
            return "no activity yet".to_string();
        };

        match (self.now - last).num_days() {
            days if days <= 0 => "today".to_string(),
            1 => "yesterday".to_string(),
            days => format!("{} days ago", days),
        }
    }

    pub fn mood_distribution(&self) -> BTreeMap<String, usize> {
        let mut moods = BTreeMap::new();
        for entry in &self.entries {
            *moods.entry(entry.mood.clone()).or_insert(0) += 1;
        }
        moods
    }

    pub fn mood_variety(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.mood.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Entries per calendar day (`YYYY-MM-DD`) on or after the date `days`
    /// before now. Days without entries are absent. A window reaching past
    /// the representable range covers every entry; a negative window past
    /// it covers none.
    pub fn activity_by_day(&self, days: i64) -> BTreeMap<String, usize> {
        let start = match Duration::try_days(days).and_then(|window| self.now.checked_sub_signed(window)) {
            Some(start) => start.date_naive(),
            None if days > 0 => NaiveDate::MIN,
            None => return BTreeMap::new(),
        };

        let mut activity = BTreeMap::new();
        for entry in &self.entries {
            let date = entry.created_at.date_naive();
            if date >= start {
                *activity.entry(date.to_string()).or_insert(0) += 1;
            }
        }
        activity
    }

    pub fn entries_by_type(&self) -> EntriesByType {
        let mut counts = EntriesByType::default();
        for element in self.elements() {
            counts.bump(element.kind());
        }
        counts
    }

    /// Longest run of consecutive calendar days with at least one entry
    pub fn weekly_streak(&self) -> usize {
        let mut dates: Vec<NaiveDate> = self
            .entries
            .iter()
            .map(|e| e.created_at.date_naive())
            .collect();
        dates.sort();
        dates.dedup();

        if dates.is_empty() {
            return 0;
        }

        let mut streak = 1;
        let mut longest = 1;
        for pair in dates.windows(2) {
            if pair[1].signed_duration_since(pair[0]).num_days() == 1 {
                streak += 1;
                longest = longest.max(streak);
            } else {
                streak = 1;
            }
        }
        longest
    }

    pub fn score_inputs(&self) -> ScoreInputs {
        let by_type = self.entries_by_type();
        ScoreInputs {
            completed_tasks: self.completed_tasks(),
            active_days: self.activity_by_day(config::PRODUCTIVITY_WINDOW_DAYS).len(),
            file_count: self.files.len(),
            nonzero_types: by_type.nonzero_types(),
            problem_count: by_type.problem,
        }
    }

    pub fn productivity_score(&self) -> u32 {
        self.score_inputs().score()
    }

    /// Unlocked badges, in catalog order
    pub fn achievements(&self) -> Vec<Achievement> {
        let by_type = self.entries_by_type();
        let completed = self.completed_tasks();

        ACHIEVEMENT_CATALOG
            .iter()
            .filter(|rule| {
                let value = match rule.metric {
                    Metric::Entries => self.entries.len(),
                    Metric::CompletedTasks => completed,
                    Metric::ProblemElements => by_type.problem,
                    Metric::AchievementElements => by_type.achievement,
                    Metric::Files => self.files.len(),
                };
                value >= rule.threshold
            })
            .map(|rule| rule.badge.clone())
            .collect()
    }

    pub fn productivity_analysis(&self) -> ProductivityAnalysis {
        let score = self.productivity_score();
        let basic = self.basic_stats();

        let mut strengths = Vec::new();
        if basic.completed_tasks > 20 {
            strengths.push("task completion");
        }
        if basic.total_entries > 30 {
            strengths.push("consistent writing");
        }
        if self.achievements().len() > 3 {
            strengths.push("varied achievements");
        }

        let mut weaknesses = Vec::new();
        if basic.task_completion_rate < 50.0 {
            weaknesses.push("low task completion rate");
        }
        if basic.total_entries < 10 {
            weaknesses.push("few entries");
        }
        if self.entries_by_type().nonzero_types() < 3 {
            weaknesses.push("little content variety");
        }

        ProductivityAnalysis {
            score,
            level: ProductivityLevel::from_score(score),
            strengths,
            weaknesses,
        }
    }

    pub fn overview(&self) -> StatsOverview {
        StatsOverview {
            basic: self.basic_stats(),
            mood_distribution: self.mood_distribution(),
            entries_by_type: self.entries_by_type(),
            productivity_score: self.productivity_score(),
        }
    }
}

/// Service computing statistics for registered users
#[derive(Clone)]
pub struct StatsService {
    repo: Repository,
    avatars: AvatarStore,
}

impl StatsService {
    pub fn new(repo: Repository, avatars: AvatarStore) -> Self {
        Self { repo, avatars }
    }

    /// Snapshot a user's data; fails when the user is unknown
    pub async fn for_user(&self, user_id: &str) -> Result<Stats> {
        let document = self.repo.snapshot().await;
        let user = document
            .users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))?;

        let avatar_size = if user.has_custom_avatar() {
            self.avatars.size(user_id).await
        } else {
            None
        };
        let used = usage_bytes(user, &document.entries, avatar_size)?;

        Ok(Stats::from_document(&document, user_id, Utc::now()).with_storage_used(used))
    }

    pub async fn basic_stats(&self, user_id: &str) -> Result<BasicStats> {
        Ok(self.for_user(user_id).await?.basic_stats())
    }

    pub async fn mood_distribution(&self, user_id: &str) -> Result<BTreeMap<String, usize>> {
        Ok(self.for_user(user_id).await?.mood_distribution())
    }

    pub async fn activity_by_day(&self, user_id: &str, days: Option<i64>) -> Result<BTreeMap<String, usize>> {
        let days = days.unwrap_or(config::ACTIVITY_WINDOW_DAYS);
        Ok(self.for_user(user_id).await?.activity_by_day(days))
    }

    pub async fn entries_by_type(&self, user_id: &str) -> Result<EntriesByType> {
        Ok(self.for_user(user_id).await?.entries_by_type())
    }

    pub async fn weekly_streak(&self, user_id: &str) -> Result<usize> {
        Ok(self.for_user(user_id).await?.weekly_streak())
    }

    pub async fn mood_variety(&self, user_id: &str) -> Result<usize> {
        Ok(self.for_user(user_id).await?.mood_variety())
    }

    pub async fn achievements(&self, user_id: &str) -> Result<Vec<Achievement>> {
        Ok(self.for_user(user_id).await?.achievements())
    }

    pub async fn productivity_score(&self, user_id: &str) -> Result<u32> {
        Ok(self.for_user(user_id).await?.productivity_score())
    }

    pub async fn productivity_analysis(&self, user_id: &str) -> Result<ProductivityAnalysis> {
        Ok(self.for_user(user_id).await?.productivity_analysis())
    }

    pub async fn overview(&self, user_id: &str) -> Result<StatsOverview> {
        let stats = self.for_user(user_id).await?;
        tracing::debug!("Computed stats overview for user: {}", user_id);
        Ok(stats.overview())
    }
}
