use whatlang::{Lang, detect};

const MIN_CONFIDENCE: f64 = 0.5;

/// ISO 639-1 code of the text's language when detection is confident.
///
/// Texts of `min_words` words or fewer are never classified.
pub fn detect_language(text: &str, min_words: usize) -> Option<String> {
    if text.split_whitespace().count() <= min_words {
        return None;
    }

    if let Some(info) = detect(text)
        && (info.is_reliable() || info.confidence() >= MIN_CONFIDENCE)
    {
        return Some(lang_to_code(info.lang()));
    }

    None
}

fn lang_to_code(lang: Lang) -> String {
    match lang {
        Lang::Eng => "en".to_string(),
        Lang::Rus => "ru".to_string(),
        Lang::Cmn => "zh".to_string(),
        Lang::Spa => "es".to_string(),
        Lang::Fra => "fr".to_string(),
        Lang::Deu => "de".to_string(),
        Lang::Jpn => "ja".to_string(),
        Lang::Kor => "ko".to_string(),
        Lang::Por => "pt".to_string(),
        Lang::Ita => "it".to_string(),
        Lang::Nld => "nl".to_string(),
        Lang::Pol => "pl".to_string(),
        Lang::Tur => "tr".to_string(),
        Lang::Swe => "sv".to_string(),
        Lang::Dan => "da".to_string(),
        Lang::Fin => "fi".to_string(),
        Lang::Heb => "he".to_string(),
        Lang::Ara => "ar".to_string(),
        Lang::Hin => "hi".to_string(),
        Lang::Tha => "th".to_string(),
        Lang::Vie => "vi".to_string(),
        // Codes outside the table fall back to whatlang's three-letter code.
        other => other.code().to_string(),
    }
}
