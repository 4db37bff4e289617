//! Query post-processing: dedupe near-identical oracle queries and top up
//! thin waves from angle-keyed fallback templates.

use channelscout_common::QueryAngle;

use crate::regions::category_terms;
use crate::traits::ProposedQuery;

/// Drop queries whose token sets overlap a kept query by more than 70%;
/// the oracle loves emitting the same query with one word swapped.
pub fn dedup_queries(queries: Vec<ProposedQuery>) -> Vec<ProposedQuery> {
    let mut unique: Vec<ProposedQuery> = Vec::new();
    let mut seen_words: Vec<std::collections::HashSet<String>> = Vec::new();

    for q in queries {
        let words: std::collections::HashSet<String> = q
            .query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if words.is_empty() {
            continue;
        }
        let is_dup = seen_words.iter().any(|prev| {
            let overlap = words.intersection(prev).count() as f64;
            let total = words.union(prev).count().max(1) as f64;
            overlap / total > 0.7
        });
        if !is_dup {
            seen_words.push(words);
            unique.push(q);
        }
    }
    unique
}

/// Deterministic queries for when the oracle under-delivers. Keyed by the
/// directive's angle so escalated waves still search differently.
pub fn fallback_queries(
    locality: &str,
    region: &str,
    category: &str,
    angle: QueryAngle,
) -> Vec<ProposedQuery> {
    let terms = category_terms(category);
    let t1 = terms.first().copied().unwrap_or("content creator");
    let t2 = terms.get(1).copied().unwrap_or(t1);
    let t3 = terms.get(2).copied().unwrap_or(t1);

    let templates: Vec<String> = match angle {
        QueryAngle::Direct => vec![
            format!(r#""{locality}" youtuber {t1}"#),
            format!(r#""{locality}" {t1} youtube channel subscribers"#),
            format!(r#""youtubers from {region}" {t1} OR {t2}"#),
            format!(r#""{locality}" "{t2}" "my channel" OR "subscribe""#),
        ],
        QueryAngle::Press => vec![
            format!(r#""{locality}" "content creator" {t3} interview"#),
            format!(r#""{locality}" local {t1} creator OR influencer"#),
            format!(r#""{locality}" {t2} youtuber profile feature"#),
            format!(r#""{region}" {t3} youtuber collab OR feature"#),
        ],
        QueryAngle::Forums => vec![
            format!(r#"site:reddit.com "{locality}" youtube {t2}"#),
            format!(r#""{locality}" {t1} recommendation OR underrated youtube"#),
            format!(r#""{locality}" {t2} forum channel recommendation"#),
        ],
        QueryAngle::Listings => vec![
            format!(r#""best {t1} youtubers" "{region}" OR "{locality}""#),
            format!(r#""{region}" youtube channel {t1} 2024 OR 2025"#),
            format!(r#""{region}" underrated {t1} youtube small channel"#),
        ],
        QueryAngle::Events => vec![
            format!(r#""{locality}" {t2} meetup OR convention OR festival"#),
            format!(r#""{locality}" {t2} podcast OR interview youtuber"#),
            format!(r#""greater {locality}" OR "{locality} area" youtuber {t1}"#),
        ],
        QueryAngle::Social => vec![
            format!(r#"site:twitter.com OR site:instagram.com "{locality}" {t1} youtube"#),
            format!(r#""{locality}" {t2} tiktok youtube creator"#),
            format!(r#"site:linkedin.com "{locality}" youtube {t1} creator"#),
        ],
        QueryAngle::Lists => vec![
            format!(r#""youtubers from {region}" list {t1}"#),
            format!(r#""{locality}" top {t2} channels ranked"#),
            format!(r#""{region}" {t3} creators to watch"#),
        ],
    };

    templates
        .into_iter()
        .map(|query| ProposedQuery {
            query,
            angle: angle.to_string(),
        })
        .collect()
}

/// Dedup oracle output, top up to at least four queries from the fallback
/// set, cap at `max`.
pub fn finalize_queries(
    proposed: Vec<ProposedQuery>,
    locality: &str,
    region: &str,
    category: &str,
    angle: QueryAngle,
    max: usize,
) -> Vec<ProposedQuery> {
    let mut queries = dedup_queries(proposed);

    if queries.len() < 4 {
        let seen: std::collections::HashSet<String> = queries
            .iter()
            .map(|q| q.query.to_lowercase().trim().to_string())
            .collect();
        for fb in fallback_queries(locality, region, category, angle) {
            if !seen.contains(&fb.query.to_lowercase().trim().to_string()) {
                queries.push(fb);
            }
        }
    }

    queries.truncate(max);
    queries
}
