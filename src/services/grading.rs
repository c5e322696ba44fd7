// src/services/grading.rs

use std::collections::HashSet;

pub const CORRECT_SCORE: f64 = 1.0;
pub const PARTIAL_SCORE: f64 = 0.5;

/// Outcome of comparing a user's selected options with the answer key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grade {
    pub is_correct: bool,
    pub is_partial: bool,
    pub unattempted: bool,
    pub score: f64,
}

/// Grades one answer.
///
/// Correct means the selection equals the key exactly. Partial means some of
/// the key was selected and nothing outside it was.
pub fn grade_answer(correct_answers: &[String], attempted_options: &[String]) -> Grade {
    let attempted: HashSet<&str> = attempted_options.iter().map(String::as_str).collect();
    let correct: HashSet<&str> = correct_answers.iter().map(String::as_str).collect();

    if attempted.is_empty() {
        return Grade {
            is_correct: false,
            is_partial: false,
            unattempted: true,
            score: 0.0,
        };
    }

    let is_correct = attempted == correct;
    let is_partial = !is_correct
        && attempted.intersection(&correct).next().is_some()
        && attempted.is_subset(&correct);

    let score = if is_correct {
        CORRECT_SCORE
    } else if is_partial {
        PARTIAL_SCORE
    } else {
        0.0
    };

    Grade {
        is_correct,
        is_partial,
        unattempted: false,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(items: &[&str]) -> Vec<String> {
        items.iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn exact_match_is_correct() {
        let grade = grade_answer(&s(&["A", "C"]), &s(&["C", "A"]));
        assert!(grade.is_correct);
        assert!(!grade.is_partial);
        assert_eq!(grade.score, CORRECT_SCORE);
    }

    #[test]
    fn subset_is_partial() {
        let grade = grade_answer(&s(&["A", "C"]), &s(&["A"]));
        assert!(!grade.is_correct);
        assert!(grade.is_partial);
        assert_eq!(grade.score, PARTIAL_SCORE);
    }

    #[test]
    fn wrong_option_spoils_partial_credit() {
        let grade = grade_answer(&s(&["A", "C"]), &s(&["A", "B"]));
        assert!(!grade.is_correct);
        assert!(!grade.is_partial);
        assert_eq!(grade.score, 0.0);
    }

    #[test]
    fn empty_selection_is_unattempted() {
        let grade = grade_answer(&s(&["True"]), &[]);
        assert!(grade.unattempted);
        assert_eq!(grade.score, 0.0);
    }
}
