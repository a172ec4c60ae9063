// Aggregate statistics over a caller's visible achievements.
//
// Computation is pure; the engine gathers the (record, document) pairs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::achievements::{AchievementStatus, CompetitionLevel, DocumentRecord, UserId, WorkflowRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    pub total: usize,
    pub draft: usize,
    pub submitted: usize,
    pub verified: usize,
    pub rejected: usize,
    /// Percentage of all records that are verified; 0 when there are none.
    pub verification_rate: f64,
    pub total_students_involved: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStatistic {
    pub category: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStatistic {
    /// `YYYY-MM` of record creation
    pub period: String,
    pub count: usize,
    pub verified: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionLevelStatistic {
    pub level: CompetitionLevel,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRanking {
    pub student_id: UserId,
    pub total: usize,
    pub verified: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementStatistics {
    pub summary: StatisticsSummary,
    pub by_status: BTreeMap<AchievementStatus, usize>,
    pub by_type: Vec<CategoryStatistic>,
    pub by_period: Vec<PeriodStatistic>,
    pub competition_levels: Vec<CompetitionLevelStatistic>,
    pub top_students: Vec<StudentRanking>,
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

impl AchievementStatistics {
    /// Aggregate `entries` in the order given.
    ///
    /// Records without a document still count toward status totals and the
    /// student ranking, but not toward category or competition breakdowns.
    /// Ties in the ranking keep first-appearance order.
    pub fn compute(entries: &[(WorkflowRecord, Option<DocumentRecord>)], top_n: usize) -> Self {
        let total = entries.len();

        let mut by_status: BTreeMap<AchievementStatus, usize> =
            AchievementStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut categories: Vec<(String, usize)> = Vec::new();
        let mut periods: BTreeMap<String, PeriodStatistic> = BTreeMap::new();
        let mut levels: BTreeMap<CompetitionLevel, usize> = BTreeMap::new();
        let mut rankings: Vec<StudentRanking> = Vec::new();
        let mut ranking_index: HashMap<UserId, usize> = HashMap::new();

        for (record, document) in entries {
            *by_status.entry(record.status).or_insert(0) += 1;
            let verified = record.status == AchievementStatus::Verified;

            let period = record.created_at.format("%Y-%m").to_string();
            let bucket = periods.entry(period.clone()).or_insert(PeriodStatistic {
                period,
                count: 0,
                verified: 0,
            });
            bucket.count += 1;
            if verified {
                bucket.verified += 1;
            }

            let index = *ranking_index
                .entry(record.student_id.clone())
                .or_insert_with(|| {
                    rankings.push(StudentRanking {
                        student_id: record.student_id.clone(),
                        total: 0,
                        verified: 0,
                        pending: 0,
                    });
                    rankings.len() - 1
                });
            let ranking = &mut rankings[index];
            ranking.total += 1;
            match record.status {
                AchievementStatus::Verified => ranking.verified += 1,
                AchievementStatus::Submitted => ranking.pending += 1,
                _ => {}
            }

            if let Some(document) = document {
                let category = document.content.category();
                match categories.iter_mut().find(|(name, _)| name == category) {
                    Some((_, count)) => *count += 1,
                    None => categories.push((category.to_string(), 1)),
                }

                if let Some(level) = document.content.details.competition_level() {
                    *levels.entry(level).or_insert(0) += 1;
                }
            }
        }

        let count_of = |status| by_status.get(&status).copied().unwrap_or(0);
        let verified = count_of(AchievementStatus::Verified);

        let summary = StatisticsSummary {
            total,
            draft: count_of(AchievementStatus::Draft),
            submitted: count_of(AchievementStatus::Submitted),
            verified,
            rejected: count_of(AchievementStatus::Rejected),
            verification_rate: percentage(verified, total),
            total_students_involved: rankings.len(),
        };

        // sort_by is stable, so equal counts keep first-appearance order
        categories.sort_by(|a, b| b.1.cmp(&a.1));
        let by_type = categories
            .into_iter()
            .map(|(category, count)| CategoryStatistic {
                category,
                count,
                percentage: percentage(count, total),
            })
            .collect();

        rankings.sort_by(|a, b| b.total.cmp(&a.total));
        rankings.truncate(top_n);

        Self {
            summary,
            by_status,
            by_type,
            by_period: periods.into_values().collect(),
            competition_levels: levels
                .into_iter()
                .map(|(level, count)| CompetitionLevelStatistic { level, count })
                .collect(),
            top_students: rankings,
        }
    }
}
