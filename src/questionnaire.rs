//! Fixed, ordered list of profile questions.

use serde::Serialize;

use crate::i18n::{self, Language, MsgKey};
use crate::models::ProfileValue;

/// Postal codes of exactly this many digits trigger an address lookup.
pub const POSTAL_CODE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Radio,
    Checkbox,
    Number,
    Address,
}

#[derive(Debug, Clone, Copy)]
pub struct Question {
    pub key: &'static str,
    pub kind: QuestionKind,
    pub prompt: MsgKey,
    pub options: &'static [&'static str],
}

impl Question {
    pub fn prompt(&self, lang: Language) -> &'static str {
        i18n::text(lang, self.prompt)
    }

    /// Localized option labels, in catalog order.
    pub fn option_labels(&self, lang: Language) -> Vec<String> {
        self.options
            .iter()
            .map(|option| i18n::option_label(lang, option))
            .collect()
    }

    /// Resolves user input to an option key, matching either the key or its label.
    pub fn resolve_option(&self, lang: Language, input: &str) -> Option<&'static str> {
        let needle = input.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.options.iter().copied().find(|option| {
            option.to_lowercase() == needle || i18n::option_label(lang, option).to_lowercase() == needle
        })
    }

    /// True when a stored value has the shape this question produces.
    pub fn accepts(&self, value: &ProfileValue) -> bool {
        match (self.kind, value) {
            (QuestionKind::Radio, ProfileValue::Text(text)) => self.options.contains(&text.as_str()),
            (QuestionKind::Checkbox, ProfileValue::Choices(choices)) => {
                !choices.is_empty() && choices.iter().all(|c| self.options.contains(&c.as_str()))
            }
            (QuestionKind::Number, ProfileValue::Number(n)) => n.is_finite(),
            (QuestionKind::Address, ProfileValue::Address(address)) => address.is_complete(),
            _ => false,
        }
    }
}

pub const QUESTIONS: &[Question] = &[
    Question {
        key: "gender",
        kind: QuestionKind::Radio,
        prompt: MsgKey::PromptGender,
        options: &["female", "male", "non_binary"],
    },
    Question {
        key: "age",
        kind: QuestionKind::Number,
        prompt: MsgKey::PromptAge,
        options: &[],
    },
    Question {
        key: "height_cm",
        kind: QuestionKind::Number,
        prompt: MsgKey::PromptHeight,
        options: &[],
    },
    Question {
        key: "clothing_size",
        kind: QuestionKind::Radio,
        prompt: MsgKey::PromptClothingSize,
        options: &["pp", "p", "m", "g", "gg"],
    },
    Question {
        key: "shoe_size",
        kind: QuestionKind::Number,
        prompt: MsgKey::PromptShoeSize,
        options: &[],
    },
    Question {
        key: "styles",
        kind: QuestionKind::Checkbox,
        prompt: MsgKey::PromptStyles,
        options: &["casual", "classic", "sporty", "streetwear", "boho", "minimalist"],
    },
    Question {
        key: "colors",
        kind: QuestionKind::Checkbox,
        prompt: MsgKey::PromptColors,
        options: &["neutrals", "earth_tones", "pastels", "vibrant", "black_white"],
    },
    Question {
        key: "budget",
        kind: QuestionKind::Radio,
        prompt: MsgKey::PromptBudget,
        options: &["up_to_100", "from_100_to_300", "from_300_to_600", "above_600"],
    },
    Question {
        key: "address",
        kind: QuestionKind::Address,
        prompt: MsgKey::PromptAddress,
        options: &[],
    },
];

/// Parses a numeric answer. Accepts `,` as decimal separator.
pub fn parse_number(input: &str) -> Option<f64> {
    let normalized = input.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Digits of a postal code, when it has the length that triggers a lookup.
pub fn lookup_ready_postal_code(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == POSTAL_CODE_LEN).then_some(digits)
}
