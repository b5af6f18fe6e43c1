use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::ConfigError;

/// OCR 语言目录（固定 7 项），默认英语
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Language {
    #[default]
    English,
    Spanish,
    French,
    German,
    ChineseSimplified,
    Japanese,
    Russian,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::ChineseSimplified,
        Language::Japanese,
        Language::Russian,
    ];

    /// Tesseract traineddata code
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "eng",
            Language::Spanish => "spa",
            Language::French => "fra",
            Language::German => "deu",
            Language::ChineseSimplified => "chi_sim",
            Language::Japanese => "jpn",
            Language::Russian => "rus",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::German => "German",
            Language::ChineseSimplified => "Chinese",
            Language::Japanese => "Japanese",
            Language::Russian => "Russian",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Language {
    type Err = ConfigError;

    /// 接受显示名或引擎代码，大小写不敏感
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Language::ALL
            .into_iter()
            .find(|lang| {
                lang.code().eq_ignore_ascii_case(needle)
                    || lang.display_name().eq_ignore_ascii_case(needle)
            })
            .or_else(|| {
                needle
                    .eq_ignore_ascii_case("Chinese-Simplified")
                    .then_some(Language::ChineseSimplified)
            })
            .ok_or_else(|| ConfigError::UnknownLanguage(needle.to_string()))
    }
}

impl TryFrom<String> for Language {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Language> for String {
    fn from(lang: Language) -> Self {
        lang.code().to_string()
    }
}
