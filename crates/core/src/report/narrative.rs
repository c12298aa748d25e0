use super::SessionStats;
use crate::emotion::{first_max_index, EmotionCategory};
use std::fmt::Write as _;

/// How much the dominant label moved during a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stability {
    Stable,
    Low,
    Moderate,
    High,
}

impl Stability {
    pub fn from_changes(changes: usize) -> Self {
        match changes {
            0 => Self::Stable,
            1..=2 => Self::Low,
            3..=7 => Self::Moderate,
            _ => Self::High,
        }
    }
}

fn interpretation(category: EmotionCategory) -> &'static str {
    match category {
        EmotionCategory::Neutral => {
            "A mostly neutral delivery may point to:\n\
             - an objective or analytical approach to the topic\n\
             - a formal or professional conversation\n\
             - a focus on facts rather than feelings\n\
             - some emotional restraint or control over expression"
        }
        EmotionCategory::Happy => {
            "A mostly joyful delivery reflects:\n\
             - a positive and open emotional state\n\
             - a pleasant communication climate\n\
             - a conversation about topics you enjoy or feel enthusiastic about\n\
             - an optimistic attitude toward the subject"
        }
        EmotionCategory::Sad => {
            "A predominantly sad delivery may reflect:\n\
             - a melancholic or nostalgic mood\n\
             - a conversation about emotionally difficult topics\n\
             - thoughts about loss or regret\n\
             - an empathetic tone toward painful situations"
        }
        EmotionCategory::Angry => {
            "A predominantly angry delivery suggests:\n\
             - emotional intensity tied to a sense of injustice\n\
             - frustration with obstacles or difficulties\n\
             - strong disagreement or indignation\n\
             - high emotional energy during the exchange"
        }
        EmotionCategory::Fear => {
            "A predominantly fearful delivery may indicate:\n\
             - anxiety or apprehension about the topic\n\
             - a sense of threat or uncertainty\n\
             - concern about potential risks\n\
             - emotional vulnerability during the exchange"
        }
        EmotionCategory::Disgust => {
            "A predominantly disgusted delivery suggests:\n\
             - a strong moral or physical aversion\n\
             - rejection of certain ideas or situations\n\
             - a markedly negative assessment\n\
             - emotional distance from things perceived as repellent"
        }
        EmotionCategory::Surprise => {
            "A predominantly surprised delivery indicates:\n\
             - reactions to the unexpected or the new\n\
             - moments of discovery or revelation\n\
             - openness to new information\n\
             - active engagement in the exchange"
        }
    }
}

struct SuggestionRule {
    applies: fn(EmotionCategory, usize) -> bool,
    text: &'static str,
}

/// Checked in order; the first match wins.
const SUGGESTIONS: &[SuggestionRule] = &[
    SuggestionRule {
        applies: |dominant, changes| dominant == EmotionCategory::Neutral && changes < 3,
        text: "- Try adding more tonal variation to enrich your delivery\n\
               - Experiment with expressing positive emotions to increase engagement",
    },
    SuggestionRule {
        applies: |dominant, _| matches!(dominant, EmotionCategory::Sad | EmotionCategory::Fear),
        text: "- Notice your current leaning toward darker emotions\n\
               - Consider how this tone may affect the person you are talking to",
    },
    SuggestionRule {
        applies: |dominant, changes| dominant == EmotionCategory::Angry && changes > 5,
        text: "- Note the emotional volatility showing through in your voice\n\
               - Explore emotional regulation techniques if appropriate",
    },
    SuggestionRule {
        applies: |dominant, _| dominant == EmotionCategory::Happy,
        text: "- Your positive tone likely creates a favorable communication climate\n\
               - A joyful delivery is generally perceived as engaging and motivating",
    },
];

const DEFAULT_SUGGESTION: &str = "- Become aware of your emotional expression habits\n\
                                  - Adapt your delivery to the context and to your communication goals";

fn suggestion(dominant: EmotionCategory, changes: usize) -> &'static str {
    SUGGESTIONS
        .iter()
        .find(|rule| (rule.applies)(dominant, changes))
        .map_or(DEFAULT_SUGGESTION, |rule| rule.text)
}

/// Runner-up category, if it took any share of the session.
fn second_category(stats: &SessionStats) -> Option<EmotionCategory> {
    let mut masked: Vec<i64> = stats.distribution.iter().map(|&p| i64::from(p)).collect();
    let top = first_max_index(&masked)?;
    masked[top] = -1;
    let second = first_max_index(&masked)?;
    if masked[second] > 0 {
        EmotionCategory::from_index(second)
    } else {
        None
    }
}

/// Builds the multi-paragraph summary shown at the end of a session.
pub fn narrative(stats: &SessionStats) -> String {
    let dominant = stats.dominant;
    let changes = stats.changes;
    let mut text = String::new();

    let _ = write!(
        text,
        "During this {} recording, your voice was analyzed for emotional expression.\n\n",
        stats.duration
    );

    text.push_str("SUMMARY OF DETECTED EMOTIONS:\n");
    let _ = writeln!(
        text,
        "- Dominant emotion: \"{}\" ({}% of the time)",
        dominant.display_name(),
        stats.percent(dominant)
    );
    if let Some(second) = second_category(stats) {
        let _ = writeln!(
            text,
            "- Second notable emotion: \"{}\" ({}% of the time)",
            second.display_name(),
            stats.percent(second)
        );
    }
    let _ = write!(text, "- Emotional changes detected: {changes}\n\n");

    let stability = match Stability::from_changes(changes) {
        Stability::Stable => "EMOTIONAL STABILITY:\n\
             Your emotional expression stayed remarkably steady throughout the recording, \
             which may indicate strong focus or a consistent stance on the topic."
            .to_string(),
        Stability::Low => format!(
            "EMOTIONAL STABILITY:\n\
             Your emotional expression varied little ({changes} notable changes), \
             suggesting a fairly consistent emotional state with a few moments of transition."
        ),
        Stability::Moderate => format!(
            "EMOTIONAL VARIABILITY:\n\
             Your emotional expression showed moderate variability ({changes} changes detected), \
             indicating that you moved through different emotional states during the conversation."
        ),
        Stability::High => format!(
            "HIGH EMOTIONAL VARIABILITY:\n\
             Your emotional expression varied significantly ({changes} changes detected), \
             which may reflect high emotional reactivity or a conversation covering \
             emotionally very different topics."
        ),
    };
    text.push_str(&stability);
    text.push_str("\n\n");

    text.push_str("INTERPRETATION OF THE DOMINANT EMOTION:\n");
    text.push_str(interpretation(dominant));

    text.push_str("\n\nPERSONALIZED SUGGESTIONS:\n");
    text.push_str(suggestion(dominant, changes));

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionCategory::*;
    use crate::report::compute_stats;
    use crate::session::SessionRecord;

    fn stats(dominant: EmotionCategory, distribution: [u32; 7], changes: usize) -> SessionStats {
        SessionStats {
            dominant,
            distribution,
            changes,
            duration: "01:30".into(),
        }
    }

    #[test]
    fn stability_buckets() {
        assert_eq!(Stability::from_changes(0), Stability::Stable);
        assert_eq!(Stability::from_changes(1), Stability::Low);
        assert_eq!(Stability::from_changes(2), Stability::Low);
        assert_eq!(Stability::from_changes(3), Stability::Moderate);
        assert_eq!(Stability::from_changes(7), Stability::Moderate);
        assert_eq!(Stability::from_changes(8), Stability::High);
    }

    #[test]
    fn suggestion_rules_apply_in_order() {
        assert!(suggestion(Neutral, 2).contains("tonal variation"));
        assert!(suggestion(Neutral, 3).contains("aware of your emotional"));
        assert!(suggestion(Sad, 10).contains("darker emotions"));
        assert!(suggestion(Fear, 0).contains("darker emotions"));
        assert!(suggestion(Angry, 6).contains("volatility"));
        assert!(suggestion(Angry, 5).contains("aware of your emotional"));
        assert!(suggestion(Happy, 9).contains("favorable"));
        assert!(suggestion(Surprise, 0).contains("aware of your emotional"));
    }

    #[test]
    fn narrative_mentions_dominant_and_runner_up() {
        let s = stats(Happy, [10, 60, 30, 0, 0, 0, 0], 4);
        let text = narrative(&s);
        assert!(text.contains("01:30"));
        assert!(text.contains("\"Happy\" (60% of the time)"));
        assert!(text.contains("\"Sad\" (30% of the time)"));
        assert!(text.contains("Emotional changes detected: 4"));
        assert!(text.contains("moderate variability"));
        assert!(text.contains("mostly joyful"));
        assert!(text.contains("favorable"));
    }

    #[test]
    fn runner_up_is_omitted_when_nothing_else_occurred() {
        let s = stats(Disgust, [0, 0, 0, 0, 0, 100, 0], 0);
        let text = narrative(&s);
        assert!(!text.contains("Second notable emotion"));
        assert!(text.contains("remarkably steady"));
        assert!(text.contains("disgusted"));
    }

    #[test]
    fn runner_up_ties_go_to_lowest_index() {
        let s = stats(Neutral, [40, 0, 0, 30, 0, 0, 30], 3);
        assert_eq!(second_category(&s), Some(Angry));
    }

    #[test]
    fn empty_session_narrative() {
        let s = compute_stats(&SessionRecord::default());
        let text = narrative(&s);
        assert!(text.contains("\"Neutral\" (0% of the time)"));
        assert!(!text.contains("Second notable emotion"));
        assert!(text.contains("tonal variation"));
    }

    #[test]
    fn every_category_has_an_interpretation() {
        for category in EmotionCategory::ALL {
            assert!(!interpretation(category).is_empty());
        }
    }
}
