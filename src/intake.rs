//! Profile intake flow.
//!
//! A linear question wizard: confirm the email, walk [`QUESTIONS`] in order,
//! then stop at `Complete`. Every accepted answer is written to the client
//! store right away so a reload resumes at the first unanswered question.
//! Invalid input never advances the state; it appends one localized
//! validation message to the transcript instead.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::AppError;
use crate::i18n::{self, Language, MsgKey};
use crate::models::{Address, BotMessage, ConversationMessage, Profile, ProfileValue};
use crate::postal::PostalLookup;
use crate::questionnaire::{self, Question, QuestionKind, QUESTIONS};
use crate::storage::{KeyValueStore, KeyValueStoreExt, StoreKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeState {
    EmailConfirm,
    EmailCorrection,
    Question(usize),
    Complete,
}

impl IntakeState {
    /// Numeric position: -2, -1, question index, or the question count.
    pub fn index(&self) -> i32 {
        match self {
            IntakeState::EmailConfirm => -2,
            IntakeState::EmailCorrection => -1,
            IntakeState::Question(i) => *i as i32,
            IntakeState::Complete => QUESTIONS.len() as i32,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            IntakeState::EmailConfirm => "email_confirm",
            IntakeState::EmailCorrection => "email_correction",
            IntakeState::Question(_) => "question",
            IntakeState::Complete => "complete",
        }
    }
}

/// Where a stored profile resumes.
///
/// An empty profile starts at the email confirmation. Otherwise the first
/// question whose answer is missing (or has the wrong shape) is active, and a
/// fully answered profile is complete.
pub fn resume_state(profile: &Profile) -> IntakeState {
    if profile.is_empty() {
        return IntakeState::EmailConfirm;
    }
    first_open_question(profile)
}

fn first_open_question(profile: &Profile) -> IntakeState {
    QUESTIONS
        .iter()
        .position(|q| !profile.get(q.key).map(|v| q.accepts(v)).unwrap_or(false))
        .map(IntakeState::Question)
        .unwrap_or(IntakeState::Complete)
}

/// Partial address edit. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressInput {
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl AddressInput {
    fn merge_into(&self, address: &mut Address) {
        let fields = [
            (&self.postal_code, &mut address.postal_code),
            (&self.city, &mut address.city),
            (&self.state, &mut address.state),
            (&self.country, &mut address.country),
        ];
        for (input, target) in fields {
            if let Some(value) = input {
                *target = value.trim().to_string();
            }
        }
    }
}

/// What the user submitted for the active prompt.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Number(f64),
    Text(String),
    Selections(Vec<String>),
    Address(AddressInput),
}

impl Answer {
    /// How the answer is echoed in the transcript.
    fn echo(&self) -> String {
        match self {
            Answer::Number(n) => n.to_string(),
            Answer::Text(text) => text.trim().to_string(),
            Answer::Selections(items) => items.join(", "),
            Answer::Address(input) => [
                &input.postal_code,
                &input.city,
                &input.state,
                &input.country,
            ]
            .iter()
            .filter_map(|f| f.as_deref())
            .collect::<Vec<_>>()
            .join(", "),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    NotAttempted,
    Found,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressUpdate {
    pub draft: Address,
    pub lookup: LookupStatus,
    pub messages: Vec<ConversationMessage>,
}

/// Result of one answer.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub advanced: bool,
    pub state: IntakeState,
    /// Transcript entries appended by this step.
    pub messages: Vec<ConversationMessage>,
    /// Full answer set, present only on the step that reached `Complete`.
    pub completed: Option<Profile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionView {
    pub key: &'static str,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub key: &'static str,
    pub kind: QuestionKind,
    pub prompt: &'static str,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeSnapshot {
    pub stage: &'static str,
    pub index: i32,
    pub total: usize,
    pub question: Option<QuestionView>,
    pub address_draft: Option<Address>,
    pub can_redo: bool,
    pub transcript: Vec<ConversationMessage>,
}

pub struct IntakeFlow {
    store: Arc<dyn KeyValueStore>,
    lang: Language,
    email: Option<String>,
    profile: Profile,
    state: IntakeState,
    transcript: Vec<ConversationMessage>,
    address_draft: Address,
    last_lookup: Option<String>,
}

impl IntakeFlow {
    /// Reads the stored profile and email and resumes where the user left off.
    pub fn load(store: Arc<dyn KeyValueStore>, lang: Language) -> Result<Self, AppError> {
        let profile = store.load_profile()?;
        let email = store
            .get(StoreKey::Email)?
            .filter(|email| !email.trim().is_empty());

        let mut state = resume_state(&profile);
        if state == IntakeState::EmailConfirm && email.is_none() {
            state = IntakeState::EmailCorrection;
        }

        let address_draft = match profile.get("address") {
            Some(ProfileValue::Address(address)) => address.clone(),
            _ => Address::default(),
        };

        let mut flow = Self {
            store,
            lang,
            email,
            profile,
            state,
            transcript: Vec::new(),
            address_draft,
            last_lookup: None,
        };
        let prompt = flow.prompt();
        flow.transcript.push(prompt);

        tracing::debug!(
            stage = flow.state.stage(),
            index = flow.state.index(),
            "Intake flow resumed"
        );
        Ok(flow)
    }

    pub fn state(&self) -> IntakeState {
        self.state
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn transcript(&self) -> &[ConversationMessage] {
        &self.transcript
    }

    pub fn address_draft(&self) -> &Address {
        &self.address_draft
    }

    pub fn language(&self) -> Language {
        self.lang
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    fn active_question(&self) -> Option<&'static Question> {
        match self.state {
            IntakeState::Question(i) => QUESTIONS.get(i),
            _ => None,
        }
    }

    /// The bot entry that asks for the active state.
    pub fn prompt(&self) -> ConversationMessage {
        let lang = self.lang;
        let bot = match self.state {
            IntakeState::EmailConfirm => {
                let text = i18n::text(lang, MsgKey::EmailConfirmPrompt)
                    .replace("{email}", self.email.as_deref().unwrap_or_default());
                BotMessage::text(text).with_choices(vec![
                    i18n::text(lang, MsgKey::Affirmative).to_string(),
                    i18n::text(lang, MsgKey::Negative).to_string(),
                ])
            }
            IntakeState::EmailCorrection => {
                BotMessage::text(i18n::text(lang, MsgKey::EmailCorrectionPrompt))
            }
            IntakeState::Question(i) => {
                let question = &QUESTIONS[i];
                let bot = BotMessage::text(question.prompt(lang));
                if question.options.is_empty() {
                    bot
                } else {
                    bot.with_choices(question.option_labels(lang))
                }
            }
            IntakeState::Complete => BotMessage::text(i18n::text(lang, MsgKey::ProfileComplete))
                .with_choices(vec![i18n::text(lang, MsgKey::RedoProfile).to_string()]),
        };
        ConversationMessage::Bot(bot)
    }

    pub fn snapshot(&self) -> IntakeSnapshot {
        let question = self.active_question().map(|q| QuestionView {
            key: q.key,
            kind: q.kind,
            prompt: q.prompt(self.lang),
            options: q
                .options
                .iter()
                .map(|&key| OptionView {
                    key,
                    label: i18n::option_label(self.lang, key),
                })
                .collect(),
        });
        let address_draft = question
            .as_ref()
            .filter(|q| q.kind == QuestionKind::Address)
            .map(|_| self.address_draft.clone());

        IntakeSnapshot {
            stage: self.state.stage(),
            index: self.state.index(),
            total: QUESTIONS.len(),
            question,
            address_draft,
            can_redo: self.state == IntakeState::Complete,
            transcript: self.transcript.clone(),
        }
    }

    /// Applies an answer to the active prompt.
    pub fn answer(&mut self, answer: Answer) -> Result<StepOutcome, AppError> {
        if self.state == IntakeState::Complete {
            return Err(AppError::BadRequest(
                "Profile is already complete".to_string(),
            ));
        }

        let start = self.transcript.len();
        self.transcript.push(ConversationMessage::User(answer.echo()));

        let next = match self.state {
            IntakeState::EmailConfirm => self.answer_email_confirm(&answer),
            IntakeState::EmailCorrection => self.answer_email_correction(&answer)?,
            IntakeState::Question(i) => self.answer_question(i, answer)?,
            IntakeState::Complete => None,
        };

        let mut completed = None;
        let advanced = next.is_some();
        if let Some(next) = next {
            self.state = next;
            let prompt = self.prompt();
            self.transcript.push(prompt);
            if next == IntakeState::Complete {
                tracing::info!("Intake profile complete ({} answers)", self.profile.len());
                completed = Some(self.profile.clone());
            }
        }

        Ok(StepOutcome {
            advanced,
            state: self.state,
            messages: self.transcript[start..].to_vec(),
            completed,
        })
    }

    fn reject(&mut self, key: MsgKey) {
        let mut bot = BotMessage::text(i18n::text(self.lang, key));
        if let Some(question) = self.active_question() {
            if !question.options.is_empty() {
                bot = bot.with_choices(question.option_labels(self.lang));
            }
        }
        tracing::debug!(stage = self.state.stage(), "Intake answer rejected: {:?}", key);
        self.transcript.push(ConversationMessage::Bot(bot));
    }

    fn answer_email_confirm(&mut self, answer: &Answer) -> Option<IntakeState> {
        let text = match answer {
            Answer::Text(text) => text.as_str(),
            _ => "",
        };

        if i18n::is_affirmative(self.lang, text) {
            // Nothing to confirm without a stored email
            if self.email.is_none() {
                return Some(IntakeState::EmailCorrection);
            }
            Some(first_open_question(&self.profile))
        } else if i18n::is_negative(self.lang, text) {
            Some(IntakeState::EmailCorrection)
        } else {
            self.reject(MsgKey::AnswerYesOrNo);
            None
        }
    }

    fn answer_email_correction(&mut self, answer: &Answer) -> Result<Option<IntakeState>, AppError> {
        let candidate = match answer {
            Answer::Text(text) => text.trim(),
            _ => "",
        };

        if !is_valid_email(candidate) {
            self.reject(MsgKey::InvalidEmail);
            return Ok(None);
        }

        self.store.set(StoreKey::Email, candidate)?;
        self.email = Some(candidate.to_string());
        tracing::info!("Intake email corrected");
        Ok(Some(first_open_question(&self.profile)))
    }

    fn answer_question(
        &mut self,
        index: usize,
        answer: Answer,
    ) -> Result<Option<IntakeState>, AppError> {
        let question = &QUESTIONS[index];

        let value = match question.kind {
            QuestionKind::Radio => self.radio_value(question, &answer),
            QuestionKind::Checkbox => self.checkbox_value(question, &answer),
            QuestionKind::Number => self.number_value(&answer),
            QuestionKind::Address => self.address_value(&answer),
        };

        let Some(value) = value else {
            return Ok(None);
        };

        self.profile.insert(question.key, value);
        self.store.save_profile(&self.profile)?;
        tracing::debug!(question = question.key, "Intake answer stored");

        let next = if index + 1 < QUESTIONS.len() {
            IntakeState::Question(index + 1)
        } else {
            IntakeState::Complete
        };
        Ok(Some(next))
    }

    fn radio_value(&mut self, question: &Question, answer: &Answer) -> Option<ProfileValue> {
        let input = match answer {
            Answer::Text(text) => Some(text.clone()),
            Answer::Number(n) => Some(n.to_string()),
            Answer::Selections(items) if items.len() == 1 => Some(items[0].clone()),
            _ => None,
        };

        match input.and_then(|input| question.resolve_option(self.lang, &input)) {
            Some(option) => Some(ProfileValue::Text(option.to_string())),
            None => {
                self.reject(MsgKey::ChooseAnOption);
                None
            }
        }
    }

    fn checkbox_value(&mut self, question: &Question, answer: &Answer) -> Option<ProfileValue> {
        let raw: Vec<String> = match answer {
            Answer::Selections(items) => items.clone(),
            Answer::Text(text) => text.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        };
        let raw: Vec<&str> = raw.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();

        if raw.is_empty() {
            self.reject(MsgKey::SelectAtLeastOne);
            return None;
        }

        let mut selected: Vec<String> = Vec::with_capacity(raw.len());
        for item in raw {
            match question.resolve_option(self.lang, item) {
                Some(option) => {
                    if !selected.iter().any(|s| s == option) {
                        selected.push(option.to_string());
                    }
                }
                None => {
                    self.reject(MsgKey::ChooseAnOption);
                    return None;
                }
            }
        }

        Some(ProfileValue::Choices(selected))
    }

    fn number_value(&mut self, answer: &Answer) -> Option<ProfileValue> {
        let parsed = match answer {
            Answer::Number(n) if n.is_finite() => Some(*n),
            Answer::Text(text) => questionnaire::parse_number(text),
            _ => None,
        };

        match parsed {
            Some(n) => Some(ProfileValue::Number(n)),
            None => {
                self.reject(MsgKey::InvalidNumber);
                None
            }
        }
    }

    fn address_value(&mut self, answer: &Answer) -> Option<ProfileValue> {
        if let Answer::Address(input) = answer {
            input.merge_into(&mut self.address_draft);
        }

        if self.address_draft.is_complete() {
            Some(ProfileValue::Address(self.address_draft.clone()))
        } else {
            self.reject(MsgKey::FillAllAddressFields);
            None
        }
    }

    /// Edits the address draft. A postal code of the lookup length triggers one
    /// lookup per distinct code that resolved (found or unknown); a failed
    /// lookup is tried again. Found places fill city/state/country.
    /// Explicit fields in `input` win over the lookup. Never advances the state.
    pub async fn update_address(
        &mut self,
        input: AddressInput,
        lookup: &dyn PostalLookup,
    ) -> Result<AddressUpdate, AppError> {
        match self.active_question() {
            Some(q) if q.kind == QuestionKind::Address => {}
            _ => {
                return Err(AppError::BadRequest(
                    "The active question does not take an address".to_string(),
                ))
            }
        }

        let start = self.transcript.len();
        let mut status = LookupStatus::NotAttempted;

        if let Some(ref raw) = input.postal_code {
            self.address_draft.postal_code = raw.trim().to_string();

            if let Some(code) = questionnaire::lookup_ready_postal_code(raw) {
                if self.last_lookup.as_deref() != Some(code.as_str()) {
                    status = match lookup.lookup(&code).await {
                        Ok(Some(place)) => {
                            self.last_lookup = Some(code.clone());
                            self.address_draft.city = place.city;
                            self.address_draft.state = place.state;
                            self.address_draft.country = place.country;
                            LookupStatus::Found
                        }
                        Ok(None) => {
                            self.last_lookup = Some(code.clone());
                            let bot = BotMessage::text(i18n::text(
                                self.lang,
                                MsgKey::PostalCodeNotFound,
                            ));
                            self.transcript.push(ConversationMessage::Bot(bot));
                            LookupStatus::NotFound
                        }
                        // Not remembered, so resubmitting the same code retries
                        Err(e) => {
                            tracing::warn!("Postal lookup for {} failed: {}", code, e);
                            LookupStatus::Failed
                        }
                    };
                }
            }
        }

        let explicit = AddressInput {
            postal_code: None,
            ..input
        };
        explicit.merge_into(&mut self.address_draft);

        Ok(AddressUpdate {
            draft: self.address_draft.clone(),
            lookup: status,
            messages: self.transcript[start..].to_vec(),
        })
    }

    /// Starts over from the email confirmation with an empty stored profile.
    pub fn redo(&mut self) -> Result<StepOutcome, AppError> {
        if self.state != IntakeState::Complete {
            return Err(AppError::BadRequest(
                "Profile can only be redone once complete".to_string(),
            ));
        }

        self.profile = Profile::default();
        self.store.save_profile(&self.profile)?;
        self.address_draft = Address::default();
        self.last_lookup = None;
        self.state = IntakeState::EmailConfirm;
        self.transcript.clear();
        let prompt = self.prompt();
        self.transcript.push(prompt);
        tracing::info!("Intake profile reset");

        Ok(StepOutcome {
            advanced: true,
            state: self.state,
            messages: self.transcript.clone(),
            completed: None,
        })
    }
}

/// Email syntax check used by the correction step.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }
    let email_regex = regex::Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    );
    match email_regex {
        Ok(re) => re.is_match(email),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postal::PostalPlace;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLookup {
        calls: AtomicUsize,
        place: Option<PostalPlace>,
        fail: bool,
    }

    impl FakeLookup {
        fn found() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                place: Some(PostalPlace {
                    city: "São Paulo".into(),
                    state: "SP".into(),
                    country: "Brasil".into(),
                }),
                fail: false,
            }
        }

        fn missing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                place: None,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                place: None,
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PostalLookup for FakeLookup {
        async fn lookup(&self, _postal_code: &str) -> Result<Option<PostalPlace>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Transport("offline".into()));
            }
            Ok(self.place.clone())
        }
    }

    fn store_with(profile: &Profile) -> Arc<dyn KeyValueStore> {
        let store = MemoryStore::new();
        store.set(StoreKey::Email, "ana@example.com").unwrap();
        store.save_profile(profile).unwrap();
        Arc::new(store)
    }

    fn full_profile() -> Profile {
        let mut profile = Profile::default();
        profile.insert("gender", ProfileValue::Text("female".into()));
        profile.insert("age", ProfileValue::Number(30.0));
        profile.insert("height_cm", ProfileValue::Number(165.0));
        profile.insert("clothing_size", ProfileValue::Text("m".into()));
        profile.insert("shoe_size", ProfileValue::Number(37.0));
        profile.insert("styles", ProfileValue::Choices(vec!["casual".into()]));
        profile.insert("colors", ProfileValue::Choices(vec!["pastels".into()]));
        profile.insert("budget", ProfileValue::Text("from_100_to_300".into()));
        profile.insert(
            "address",
            ProfileValue::Address(Address {
                postal_code: "01310100".into(),
                city: "São Paulo".into(),
                state: "SP".into(),
                country: "Brasil".into(),
            }),
        );
        profile
    }

    fn flow_at(index: usize) -> IntakeFlow {
        let full = full_profile();
        let mut profile = Profile::default();
        for q in &QUESTIONS[..index] {
            profile.insert(q.key, full.get(q.key).unwrap().clone());
        }
        if profile.is_empty() {
            // Past the email step but nothing answered yet.
            let mut flow = IntakeFlow::load(store_with(&profile), Language::Pt).unwrap();
            flow.answer(Answer::Text("Sim".into())).unwrap();
            return flow;
        }
        IntakeFlow::load(store_with(&profile), Language::Pt).unwrap()
    }

    fn validation_count(messages: &[ConversationMessage]) -> usize {
        messages.iter().filter(|m| m.as_bot().is_some()).count()
    }

    #[test]
    fn test_empty_profile_starts_at_email_confirm() {
        let flow = IntakeFlow::load(store_with(&Profile::default()), Language::Pt).unwrap();
        assert_eq!(flow.state(), IntakeState::EmailConfirm);
        assert_eq!(flow.state().index(), -2);
        assert_eq!(flow.transcript().len(), 1);
    }

    #[test]
    fn test_affirmative_moves_to_first_question() {
        let mut flow = IntakeFlow::load(store_with(&Profile::default()), Language::Pt).unwrap();
        let outcome = flow.answer(Answer::Text("sim".into())).unwrap();

        assert!(outcome.advanced);
        assert_eq!(flow.state(), IntakeState::Question(0));
    }

    #[test]
    fn test_negative_then_correction() {
        let store = store_with(&Profile::default());
        let mut flow = IntakeFlow::load(store.clone(), Language::En).unwrap();

        flow.answer(Answer::Text("No".into())).unwrap();
        assert_eq!(flow.state(), IntakeState::EmailCorrection);

        let outcome = flow.answer(Answer::Text("not-an-email".into())).unwrap();
        assert!(!outcome.advanced);
        assert_eq!(flow.state(), IntakeState::EmailCorrection);

        flow.answer(Answer::Text("bia@example.com".into())).unwrap();
        assert_eq!(flow.state(), IntakeState::Question(0));
        assert_eq!(
            store.get(StoreKey::Email).unwrap().as_deref(),
            Some("bia@example.com")
        );
    }

    #[test]
    fn test_unclear_confirmation_reprompts() {
        let mut flow = IntakeFlow::load(store_with(&Profile::default()), Language::Pt).unwrap();
        let outcome = flow.answer(Answer::Text("talvez".into())).unwrap();

        assert!(!outcome.advanced);
        assert_eq!(flow.state(), IntakeState::EmailConfirm);
        assert_eq!(validation_count(&outcome.messages), 1);
    }

    #[test]
    fn test_missing_email_starts_at_correction() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let flow = IntakeFlow::load(store, Language::Pt).unwrap();
        assert_eq!(flow.state(), IntakeState::EmailCorrection);
    }

    #[test]
    fn test_resume_at_first_unanswered() {
        for i in 1..QUESTIONS.len() {
            let flow = flow_at(i);
            assert_eq!(flow.state(), IntakeState::Question(i), "resume index {}", i);
        }
    }

    #[test]
    fn test_full_profile_is_complete_with_redo() {
        let flow = IntakeFlow::load(store_with(&full_profile()), Language::Pt).unwrap();
        let snapshot = flow.snapshot();

        assert_eq!(flow.state(), IntakeState::Complete);
        assert_eq!(snapshot.index, QUESTIONS.len() as i32);
        assert!(snapshot.can_redo);
        assert!(snapshot.question.is_none());
    }

    #[test]
    fn test_wrong_shape_counts_as_unanswered() {
        let mut profile = full_profile();
        profile.insert("age", ProfileValue::Text("thirty".into()));
        assert_eq!(resume_state(&profile), IntakeState::Question(1));
    }

    #[test]
    fn test_non_numeric_never_advances() {
        let mut flow = flow_at(1);
        let before = flow.transcript().len();
        let outcome = flow.answer(Answer::Text("trinta".into())).unwrap();

        assert!(!outcome.advanced);
        assert_eq!(flow.state(), IntakeState::Question(1));
        assert_eq!(validation_count(&outcome.messages), 1);
        assert_eq!(flow.transcript().len(), before + 2);
    }

    #[test]
    fn test_number_answer_is_persisted() {
        let store = store_with(&{
            let mut p = Profile::default();
            p.insert("gender", ProfileValue::Text("male".into()));
            p
        });
        let mut flow = IntakeFlow::load(store.clone(), Language::Pt).unwrap();
        let outcome = flow.answer(Answer::Text("29".into())).unwrap();

        assert!(outcome.advanced);
        assert_eq!(flow.state(), IntakeState::Question(2));
        assert_eq!(
            store.load_profile().unwrap().get("age"),
            Some(&ProfileValue::Number(29.0))
        );
    }

    #[test]
    fn test_radio_rejects_unknown_option() {
        let mut flow = flow_at(0);
        let outcome = flow.answer(Answer::Text("robot".into())).unwrap();
        assert!(!outcome.advanced);

        let outcome = flow.answer(Answer::Text("Feminino".into())).unwrap();
        assert!(outcome.advanced);
        assert_eq!(
            flow.profile().get("gender"),
            Some(&ProfileValue::Text("female".into()))
        );
    }

    #[test]
    fn test_checkbox_requires_a_selection() {
        let mut flow = flow_at(5);
        let outcome = flow.answer(Answer::Selections(vec![])).unwrap();

        assert!(!outcome.advanced);
        assert_eq!(flow.state(), IntakeState::Question(5));
        assert_eq!(validation_count(&outcome.messages), 1);

        let outcome = flow
            .answer(Answer::Selections(vec!["boho".into(), "Casual".into(), "boho".into()]))
            .unwrap();
        assert!(outcome.advanced);
        assert_eq!(
            flow.profile().get("styles"),
            Some(&ProfileValue::Choices(vec!["boho".into(), "casual".into()]))
        );
    }

    #[tokio::test]
    async fn test_postal_lookup_fills_but_does_not_advance() {
        let mut flow = flow_at(8);
        let lookup = FakeLookup::found();

        let update = flow
            .update_address(
                AddressInput {
                    postal_code: Some("01310-100".into()),
                    ..Default::default()
                },
                &lookup,
            )
            .await
            .unwrap();

        assert_eq!(lookup.calls(), 1);
        assert_eq!(update.lookup, LookupStatus::Found);
        assert_eq!(update.draft.city, "São Paulo");
        assert_eq!(update.draft.country, "Brasil");
        assert_eq!(flow.state(), IntakeState::Question(8));
    }

    #[tokio::test]
    async fn test_postal_lookup_runs_once_per_code() {
        let mut flow = flow_at(8);
        let lookup = FakeLookup::found();
        let input = AddressInput {
            postal_code: Some("01310100".into()),
            ..Default::default()
        };

        flow.update_address(input.clone(), &lookup).await.unwrap();
        flow.update_address(input, &lookup).await.unwrap();
        assert_eq!(lookup.calls(), 1);

        flow.update_address(
            AddressInput {
                postal_code: Some("0131".into()),
                ..Default::default()
            },
            &lookup,
        )
        .await
        .unwrap();
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_leaves_fields_unchanged() {
        for lookup in [FakeLookup::missing(), FakeLookup::failing()] {
            let mut flow = flow_at(8);
            flow.update_address(
                AddressInput {
                    city: Some("Campinas".into()),
                    ..Default::default()
                },
                &lookup,
            )
            .await
            .unwrap();

            let update = flow
                .update_address(
                    AddressInput {
                        postal_code: Some("99999999".into()),
                        ..Default::default()
                    },
                    &lookup,
                )
                .await
                .unwrap();

            assert_eq!(lookup.calls(), 1);
            assert_ne!(update.lookup, LookupStatus::Found);
            assert_eq!(update.draft.city, "Campinas");
            assert!(update.draft.state.is_empty());
            assert_eq!(flow.state(), IntakeState::Question(8));
        }
    }

    #[tokio::test]
    async fn test_failed_lookup_is_retried_for_same_code() {
        let mut flow = flow_at(8);
        let input = AddressInput {
            postal_code: Some("01310100".into()),
            ..Default::default()
        };

        let failing = FakeLookup::failing();
        let update = flow.update_address(input.clone(), &failing).await.unwrap();
        assert_eq!(update.lookup, LookupStatus::Failed);
        flow.update_address(input.clone(), &failing).await.unwrap();
        assert_eq!(failing.calls(), 2);

        let found = FakeLookup::found();
        let update = flow.update_address(input.clone(), &found).await.unwrap();
        assert_eq!(update.lookup, LookupStatus::Found);
        assert_eq!(update.draft.state, "SP");

        flow.update_address(input, &found).await.unwrap();
        assert_eq!(found.calls(), 1);
    }

    #[tokio::test]
    async fn test_address_requires_all_fields_then_completes() {
        let store = store_with(&{
            let full = full_profile();
            let mut p = Profile::default();
            for q in &QUESTIONS[..8] {
                p.insert(q.key, full.get(q.key).unwrap().clone());
            }
            p
        });
        let mut flow = IntakeFlow::load(store.clone(), Language::Pt).unwrap();

        let outcome = flow
            .answer(Answer::Address(AddressInput {
                postal_code: Some("01310100".into()),
                ..Default::default()
            }))
            .unwrap();
        assert!(!outcome.advanced);

        flow.update_address(
            AddressInput {
                postal_code: Some("01310100".into()),
                ..Default::default()
            },
            &FakeLookup::found(),
        )
        .await
        .unwrap();

        let outcome = flow.answer(Answer::Text("ok".into())).unwrap();
        assert!(outcome.advanced);
        assert_eq!(flow.state(), IntakeState::Complete);
        let completed = outcome.completed.expect("completion carries the profile");
        assert_eq!(completed.len(), QUESTIONS.len());
        assert_eq!(store.load_profile().unwrap(), completed);
    }

    #[test]
    fn test_answer_after_complete_is_rejected() {
        let mut flow = IntakeFlow::load(store_with(&full_profile()), Language::Pt).unwrap();
        assert!(flow.answer(Answer::Text("Sim".into())).is_err());
    }

    #[test]
    fn test_redo_resets_to_email_confirm() {
        let store = store_with(&full_profile());
        let mut flow = IntakeFlow::load(store.clone(), Language::Pt).unwrap();

        let outcome = flow.redo().unwrap();

        assert_eq!(outcome.state, IntakeState::EmailConfirm);
        assert!(store.load_profile().unwrap().is_empty());
        assert_eq!(store.get(StoreKey::Profile).unwrap().as_deref(), Some("{}"));
        assert_eq!(flow.transcript().len(), 1);
    }

    #[test]
    fn test_redo_without_email_confirms_then_corrects() {
        let store = MemoryStore::new();
        store.save_profile(&full_profile()).unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(store);
        let mut flow = IntakeFlow::load(store, Language::Pt).unwrap();
        assert_eq!(flow.state(), IntakeState::Complete);

        let outcome = flow.redo().unwrap();
        assert_eq!(outcome.state, IntakeState::EmailConfirm);

        let outcome = flow.answer(Answer::Text("Sim".into())).unwrap();
        assert!(outcome.advanced);
        assert_eq!(flow.state(), IntakeState::EmailCorrection);
    }

    #[test]
    fn test_redo_requires_complete() {
        let mut flow = flow_at(3);
        assert!(flow.redo().is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("ana@example.com"));
        assert!(is_valid_email("a.b+c@loja.com.br"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ana example.com"));
    }
}
