//! Static UI strings by language.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Pt,
    En,
    Es,
}

impl Language {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "pt" | "pt-br" | "pt_br" => Some(Language::Pt),
            "en" | "en-us" | "en_us" => Some(Language::En),
            "es" | "es-es" | "es_es" => Some(Language::Es),
            _ => None,
        }
    }

    /// Language for an ISO 3166 alpha-2 country code.
    pub fn from_country(country: &str) -> Self {
        match country.trim().to_ascii_uppercase().as_str() {
            "BR" | "PT" | "AO" | "MZ" => Language::Pt,
            "ES" | "AR" | "MX" | "CO" | "CL" | "PE" | "UY" | "PY" | "BO" | "EC" | "VE" => {
                Language::Es
            }
            _ => Language::En,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::Pt => "pt",
            Language::En => "en",
            Language::Es => "es",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKey {
    /// Contains `{email}`.
    EmailConfirmPrompt,
    EmailCorrectionPrompt,
    InvalidEmail,
    Affirmative,
    Negative,
    AnswerYesOrNo,
    InvalidNumber,
    SelectAtLeastOne,
    ChooseAnOption,
    FillAllAddressFields,
    PostalCodeNotFound,
    ProfileComplete,
    RedoProfile,
    PromptGender,
    PromptAge,
    PromptHeight,
    PromptClothingSize,
    PromptShoeSize,
    PromptStyles,
    PromptColors,
    PromptBudget,
    PromptAddress,
}

/// Looks up a UI string.
pub fn text(lang: Language, key: MsgKey) -> &'static str {
    use Language::*;
    use MsgKey::*;

    match (key, lang) {
        (EmailConfirmPrompt, Pt) => "Seu e-mail é {email}?",
        (EmailConfirmPrompt, En) => "Is {email} your email?",
        (EmailConfirmPrompt, Es) => "¿Tu correo es {email}?",

        (EmailCorrectionPrompt, Pt) => "Qual é o seu e-mail?",
        (EmailCorrectionPrompt, En) => "What is your email?",
        (EmailCorrectionPrompt, Es) => "¿Cuál es tu correo?",

        (InvalidEmail, Pt) => "Esse e-mail não parece válido. Tente novamente.",
        (InvalidEmail, En) => "That email does not look valid. Please try again.",
        (InvalidEmail, Es) => "Ese correo no parece válido. Inténtalo de nuevo.",

        (Affirmative, Pt) => "Sim",
        (Affirmative, En) => "Yes",
        (Affirmative, Es) => "Sí",

        (Negative, Pt) => "Não",
        (Negative, En) => "No",
        (Negative, Es) => "No",

        (AnswerYesOrNo, Pt) => "Responda sim ou não, por favor.",
        (AnswerYesOrNo, En) => "Please answer yes or no.",
        (AnswerYesOrNo, Es) => "Responde sí o no, por favor.",

        (InvalidNumber, Pt) => "Digite um número válido.",
        (InvalidNumber, En) => "Please enter a valid number.",
        (InvalidNumber, Es) => "Introduce un número válido.",

        (SelectAtLeastOne, Pt) => "Selecione pelo menos uma opção.",
        (SelectAtLeastOne, En) => "Please select at least one option.",
        (SelectAtLeastOne, Es) => "Selecciona al menos una opción.",

        (ChooseAnOption, Pt) => "Escolha uma das opções.",
        (ChooseAnOption, En) => "Please choose one of the options.",
        (ChooseAnOption, Es) => "Elige una de las opciones.",

        (FillAllAddressFields, Pt) => "Preencha CEP, cidade, estado e país.",
        (FillAllAddressFields, En) => "Please fill in postal code, city, state and country.",
        (FillAllAddressFields, Es) => "Completa código postal, ciudad, estado y país.",

        (PostalCodeNotFound, Pt) => "Não encontramos esse CEP. Preencha o endereço manualmente.",
        (PostalCodeNotFound, En) => "We could not find that postal code. Please fill in the address.",
        (PostalCodeNotFound, Es) => "No encontramos ese código postal. Completa la dirección.",

        (ProfileComplete, Pt) => "Perfil completo! Obrigado.",
        (ProfileComplete, En) => "Profile complete! Thank you.",
        (ProfileComplete, Es) => "¡Perfil completo! Gracias.",

        (RedoProfile, Pt) => "Refazer perfil",
        (RedoProfile, En) => "Redo profile",
        (RedoProfile, Es) => "Rehacer perfil",

        (PromptGender, Pt) => "Como você se identifica?",
        (PromptGender, En) => "How do you identify?",
        (PromptGender, Es) => "¿Cómo te identificas?",

        (PromptAge, Pt) => "Qual é a sua idade?",
        (PromptAge, En) => "How old are you?",
        (PromptAge, Es) => "¿Cuántos años tienes?",

        (PromptHeight, Pt) => "Qual é a sua altura em centímetros?",
        (PromptHeight, En) => "How tall are you, in centimeters?",
        (PromptHeight, Es) => "¿Cuánto mides en centímetros?",

        (PromptClothingSize, Pt) => "Qual tamanho de roupa você usa?",
        (PromptClothingSize, En) => "What clothing size do you wear?",
        (PromptClothingSize, Es) => "¿Qué talla de ropa usas?",

        (PromptShoeSize, Pt) => "Qual é o número do seu calçado?",
        (PromptShoeSize, En) => "What is your shoe size?",
        (PromptShoeSize, Es) => "¿Qué número de calzado usas?",

        (PromptStyles, Pt) => "Quais estilos combinam com você?",
        (PromptStyles, En) => "Which styles suit you?",
        (PromptStyles, Es) => "¿Qué estilos van contigo?",

        (PromptColors, Pt) => "Quais cores você prefere?",
        (PromptColors, En) => "Which colors do you prefer?",
        (PromptColors, Es) => "¿Qué colores prefieres?",

        (PromptBudget, Pt) => "Quanto você costuma gastar por peça?",
        (PromptBudget, En) => "How much do you usually spend per item?",
        (PromptBudget, Es) => "¿Cuánto sueles gastar por prenda?",

        (PromptAddress, Pt) => "Para onde enviamos suas compras? Informe o CEP.",
        (PromptAddress, En) => "Where should we ship your orders? Start with the postal code.",
        (PromptAddress, Es) => "¿A dónde enviamos tus compras? Indica el código postal.",
    }
}

/// Label shown for a question option. Unknown keys are returned as-is.
pub fn option_label(lang: Language, option: &str) -> String {
    use Language::*;

    let label = match (option, lang) {
        ("female", Pt) => "Feminino",
        ("female", En) => "Female",
        ("female", Es) => "Femenino",
        ("male", Pt) => "Masculino",
        ("male", En) => "Male",
        ("male", Es) => "Masculino",
        ("non_binary", Pt) => "Não binário",
        ("non_binary", En) => "Non-binary",
        ("non_binary", Es) => "No binario",

        ("pp", En) => "XS",
        ("p", En) => "S",
        ("g", En) => "L",
        ("gg", En) => "XL",
        ("pp", _) => "PP",
        ("p", _) => "P",
        ("m", _) => "M",
        ("g", _) => "G",
        ("gg", _) => "GG",

        ("casual", _) => "Casual",
        ("classic", Pt) => "Clássico",
        ("classic", En) => "Classic",
        ("classic", Es) => "Clásico",
        ("sporty", Pt) => "Esportivo",
        ("sporty", En) => "Sporty",
        ("sporty", Es) => "Deportivo",
        ("streetwear", _) => "Streetwear",
        ("boho", _) => "Boho",
        ("minimalist", Pt) => "Minimalista",
        ("minimalist", En) => "Minimalist",
        ("minimalist", Es) => "Minimalista",

        ("neutrals", Pt) => "Neutras",
        ("neutrals", En) => "Neutrals",
        ("neutrals", Es) => "Neutros",
        ("earth_tones", Pt) => "Tons terrosos",
        ("earth_tones", En) => "Earth tones",
        ("earth_tones", Es) => "Tonos tierra",
        ("pastels", Pt) => "Tons pastel",
        ("pastels", En) => "Pastels",
        ("pastels", Es) => "Pasteles",
        ("vibrant", Pt) => "Vibrantes",
        ("vibrant", En) => "Vibrant",
        ("vibrant", Es) => "Vibrantes",
        ("black_white", Pt) => "Preto e branco",
        ("black_white", En) => "Black and white",
        ("black_white", Es) => "Blanco y negro",

        ("up_to_100", Pt) => "Até R$ 100",
        ("up_to_100", _) => "Up to 100",
        ("from_100_to_300", Pt) => "R$ 100 a R$ 300",
        ("from_100_to_300", _) => "100 - 300",
        ("from_300_to_600", Pt) => "R$ 300 a R$ 600",
        ("from_300_to_600", _) => "300 - 600",
        ("above_600", Pt) => "Acima de R$ 600",
        ("above_600", En) => "Above 600",
        ("above_600", Es) => "Más de 600",

        (other, _) => return other.to_string(),
    };

    label.to_string()
}

/// True when `input` is the localized "yes" for `lang`, ignoring case and surrounding whitespace.
pub fn is_affirmative(lang: Language, input: &str) -> bool {
    matches_word(input, text(lang, MsgKey::Affirmative))
}

pub fn is_negative(lang: Language, input: &str) -> bool {
    matches_word(input, text(lang, MsgKey::Negative))
}

fn matches_word(input: &str, word: &str) -> bool {
    input.trim().to_lowercase() == word.to_lowercase()
}
