// src/services/quiz_source.rs

//! Where the questions for a new quiz come from.
//!
//! Questions are either served from the question bank or have to be produced
//! by the content generator. The choice is a named policy so it is
//! deterministic and can be configured per deployment.

use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuizSourcingPolicy {
    /// Serve from the bank when it holds enough questions, otherwise ask for
    /// generation of the shortfall.
    #[default]
    PreferCache,
    /// Never generate; serve whatever the bank has.
    CacheOnly,
}

impl FromStr for QuizSourcingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefer_cache" => Ok(QuizSourcingPolicy::PreferCache),
            "cache_only" => Ok(QuizSourcingPolicy::CacheOnly),
            other => Err(format!("unknown quiz sourcing policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourcingDecision {
    /// Serve `count` questions from the bank.
    Cache { count: usize },
    /// Serve the `cached` questions available and generate `missing` more.
    Generate { cached: usize, missing: usize },
}

impl QuizSourcingPolicy {
    pub fn decide(self, available: usize, requested: usize) -> SourcingDecision {
        match self {
            QuizSourcingPolicy::PreferCache if available < requested => SourcingDecision::Generate {
                cached: available,
                missing: requested - available,
            },
            QuizSourcingPolicy::PreferCache => SourcingDecision::Cache { count: requested },
            QuizSourcingPolicy::CacheOnly => SourcingDecision::Cache {
                count: available.min(requested),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefer_cache_serves_bank_when_it_is_large_enough() {
        assert_eq!(
            QuizSourcingPolicy::PreferCache.decide(12, 10),
            SourcingDecision::Cache { count: 10 }
        );
    }

    #[test]
    fn prefer_cache_requests_generation_of_the_shortfall() {
        assert_eq!(
            QuizSourcingPolicy::PreferCache.decide(3, 10),
            SourcingDecision::Generate {
                cached: 3,
                missing: 7
            }
        );
    }

    #[test]
    fn cache_only_never_generates() {
        assert_eq!(
            QuizSourcingPolicy::CacheOnly.decide(3, 10),
            SourcingDecision::Cache { count: 3 }
        );
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!(
            "cache_only".parse::<QuizSourcingPolicy>(),
            Ok(QuizSourcingPolicy::CacheOnly)
        );
        assert!("coin_flip".parse::<QuizSourcingPolicy>().is_err());
    }
}
