//! Pure answer evaluation and ranking helpers.

use std::cmp::Ordering;

use uuid::Uuid;

use crate::dao::models::{PlayerEntity, QuestionEntity, QuestionKind, SubmittedAnswer, Verdict};

/// Tolerances applied when grading typed answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMatching {
    /// Maximum edit distance accepted for long enough answers.
    pub max_distance: usize,
    /// Answers shorter than this (in characters) must match exactly.
    pub min_length: usize,
}

/// Outcome of grading one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    /// Choice picked by index, for single-choice questions.
    pub choice_id: Option<Uuid>,
}

impl Evaluation {
    fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            choice_id: None,
        }
    }
}

/// Grade `submitted` against the stored solution of `question`.
///
/// A submission whose shape does not fit the question kind is incorrect.
pub fn evaluate(question: &QuestionEntity, submitted: &SubmittedAnswer, text: TextMatching) -> Evaluation {
    match (question.kind, submitted) {
        (QuestionKind::Choice | QuestionKind::TrueFalse, SubmittedAnswer::Index(index)) => {
            match question.choices.get(*index) {
                Some(choice) => Evaluation {
                    verdict: if choice.is_correct {
                        Verdict::Correct
                    } else {
                        Verdict::Incorrect
                    },
                    choice_id: Some(choice.id),
                },
                None => Evaluation::new(Verdict::Incorrect),
            }
        }
        (QuestionKind::Puzzle, SubmittedAnswer::Sequence(sequence)) => {
            let mut expected: Vec<usize> = (0..question.choices.len()).collect();
            expected.sort_by_key(|&index| question.choices[index].order);
            if !expected.is_empty() && *sequence == expected {
                Evaluation::new(Verdict::Correct)
            } else {
                Evaluation::new(Verdict::Incorrect)
            }
        }
        (QuestionKind::TypeAnswer, SubmittedAnswer::Text(answer)) => {
            let accepted = question
                .choices
                .iter()
                .filter(|choice| choice.is_correct)
                .any(|choice| text_matches(answer, &choice.text, text));
            Evaluation::new(if accepted {
                Verdict::Correct
            } else {
                Verdict::Incorrect
            })
        }
        (QuestionKind::OpenEnded, _) => Evaluation::new(Verdict::Ungraded),
        _ => Evaluation::new(Verdict::Incorrect),
    }
}

/// Time-decayed points for an answer.
///
/// Only correct answers submitted strictly before the time limit score:
/// `floor(base_points * (time_limit - time_taken) / time_limit)`.
pub fn points(base_points: u32, time_limit_secs: u32, time_taken_secs: f64, verdict: Verdict) -> i64 {
    if verdict != Verdict::Correct || time_limit_secs == 0 {
        return 0;
    }
    let limit = f64::from(time_limit_secs);
    if !time_taken_secs.is_finite() || time_taken_secs >= limit {
        return 0;
    }
    let factor = ((limit - time_taken_secs.max(0.0)) / limit).clamp(0.0, 1.0);
    (f64::from(base_points) * factor).floor() as i64
}

/// Server-side bound on a client's claimed answer time.
///
/// The claim is clamped to zero and may not undercut the server-observed
/// elapsed time by more than `latency_allowance_secs`.
pub fn clamp_time_taken(claimed_secs: f64, server_elapsed_secs: f64, latency_allowance_secs: f64) -> f64 {
    let claimed = if claimed_secs.is_finite() {
        claimed_secs
    } else {
        server_elapsed_secs
    };
    let floor = (server_elapsed_secs - latency_allowance_secs).max(0.0);
    claimed.max(floor)
}

/// Leaderboard order: score desc, streak desc, nickname asc.
pub fn ranking(left: &PlayerEntity, right: &PlayerEntity) -> Ordering {
    right
        .score
        .cmp(&left.score)
        .then_with(|| right.streak.cmp(&left.streak))
        .then_with(|| left.nickname.cmp(&right.nickname))
}

/// Sort players in leaderboard order.
pub fn rank_players(mut players: Vec<PlayerEntity>) -> Vec<PlayerEntity> {
    players.sort_by(ranking);
    players
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn text_matches(answer: &str, accepted: &str, rules: TextMatching) -> bool {
    let answer = normalize(answer);
    let accepted = normalize(accepted);
    if answer.is_empty() || accepted.is_empty() {
        return false;
    }
    if answer == accepted {
        return true;
    }
    accepted.chars().count() >= rules.min_length
        && levenshtein(&answer, &accepted) <= rules.max_distance
}

fn levenshtein(left: &str, right: &str) -> usize {
    let right: Vec<char> = right.chars().collect();
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];

    for (i, lc) in left.chars().enumerate() {
        current[0] = i + 1;
        for (j, rc) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(lc != *rc);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right.len()]
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::ChoiceEntity;

    const RULES: TextMatching = TextMatching {
        max_distance: 1,
        min_length: 5,
    };

    fn choice(text: &str, is_correct: bool, order: i32) -> ChoiceEntity {
        ChoiceEntity {
            id: Uuid::new_v4(),
            text: text.into(),
            is_correct,
            order,
        }
    }

    fn question(kind: QuestionKind, choices: Vec<ChoiceEntity>) -> QuestionEntity {
        QuestionEntity {
            id: Uuid::new_v4(),
            text: "prompt".into(),
            kind,
            time_limit_secs: 20,
            order: 0,
            media_url: None,
            choices,
        }
    }

    fn player(nickname: &str, score: i64, streak: u32) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            nickname: nickname.into(),
            user_id: None,
            score,
            streak,
            joined_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn correct_answer_at_five_seconds_scores_750() {
        assert_eq!(points(1000, 20, 5.0, Verdict::Correct), 750);
    }

    #[test]
    fn points_never_increase_with_time_taken() {
        let mut last = i64::MAX;
        for tenth in 0..=250 {
            let current = points(1000, 20, f64::from(tenth) / 10.0, Verdict::Correct);
            assert!(current <= last, "points rose at {tenth}");
            last = current;
        }
        assert_eq!(points(1000, 20, 20.0, Verdict::Correct), 0);
        assert_eq!(points(1000, 20, 42.0, Verdict::Correct), 0);
    }

    #[test]
    fn incorrect_and_ungraded_answers_score_nothing() {
        assert_eq!(points(1000, 20, 0.0, Verdict::Incorrect), 0);
        assert_eq!(points(1000, 20, 0.0, Verdict::Ungraded), 0);
    }

    #[test]
    fn claimed_time_cannot_undercut_server_elapsed() {
        assert_eq!(clamp_time_taken(-4.0, 0.5, 2.0), 0.0);
        assert_eq!(clamp_time_taken(1.0, 10.0, 2.0), 8.0);
        assert_eq!(clamp_time_taken(9.5, 10.0, 2.0), 9.5);
        assert_eq!(clamp_time_taken(f64::NAN, 3.0, 2.0), 3.0);
    }

    #[test]
    fn choice_is_graded_by_display_index() {
        let q = question(
            QuestionKind::Choice,
            vec![choice("Paris", true, 0), choice("Lyon", false, 1)],
        );
        let right = evaluate(&q, &SubmittedAnswer::Index(0), RULES);
        assert_eq!(right.verdict, Verdict::Correct);
        assert_eq!(right.choice_id, Some(q.choices[0].id));

        assert_eq!(
            evaluate(&q, &SubmittedAnswer::Index(1), RULES).verdict,
            Verdict::Incorrect
        );
        assert_eq!(
            evaluate(&q, &SubmittedAnswer::Index(9), RULES).verdict,
            Verdict::Incorrect
        );
        assert_eq!(
            evaluate(&q, &SubmittedAnswer::Text("Paris".into()), RULES).verdict,
            Verdict::Incorrect
        );
    }

    #[test]
    fn puzzle_requires_configured_order() {
        let q = question(
            QuestionKind::Puzzle,
            vec![choice("c", false, 3), choice("a", false, 1), choice("b", false, 2)],
        );
        assert_eq!(
            evaluate(&q, &SubmittedAnswer::Sequence(vec![1, 2, 0]), RULES).verdict,
            Verdict::Correct
        );
        assert_eq!(
            evaluate(&q, &SubmittedAnswer::Sequence(vec![0, 1, 2]), RULES).verdict,
            Verdict::Incorrect
        );
    }

    #[test]
    fn typed_answers_tolerate_small_typos_on_long_words() {
        let q = question(
            QuestionKind::TypeAnswer,
            vec![choice("Bucharest", true, 0), choice("Ohm", true, 1)],
        );
        for accepted in ["bucharest", "  BUCHAREST ", "Bucharst", "ohm", "Ohm!"] {
            assert_eq!(
                evaluate(&q, &SubmittedAnswer::Text(accepted.into()), RULES).verdict,
                Verdict::Correct,
                "{accepted}"
            );
        }
        for rejected in ["Buchrst", "ohn", ""] {
            assert_eq!(
                evaluate(&q, &SubmittedAnswer::Text(rejected.into()), RULES).verdict,
                Verdict::Incorrect,
                "{rejected}"
            );
        }
    }

    #[test]
    fn open_ended_is_never_graded() {
        let q = question(QuestionKind::OpenEnded, vec![]);
        assert_eq!(
            evaluate(&q, &SubmittedAnswer::Text("anything".into()), RULES).verdict,
            Verdict::Ungraded
        );
    }

    #[test]
    fn ranking_breaks_ties_by_streak_then_nickname() {
        let ranked = rank_players(vec![
            player("zoe", 500, 1),
            player("amy", 500, 1),
            player("bob", 500, 2),
            player("max", 900, 0),
        ]);
        let order: Vec<&str> = ranked.iter().map(|p| p.nickname.as_str()).collect();
        assert_eq!(order, ["max", "bob", "amy", "zoe"]);
    }
}
