//! Arabic text canonicalization.
//!
//! Visually identical Arabic strings written with different Alef or Yaa
//! forms, or with diacritics, embed to different vectors and measurably
//! degrade retrieval. Every string crossing the embedding or routing
//! boundary goes through [`normalize`] first, ingested chunks and user
//! queries alike.

/// Canonicalize Arabic text. Idempotent: `normalize(normalize(x)) ==
/// normalize(x)`. Empty input returns empty output; never fails.
///
/// Applied transforms, in order:
/// 1. Alef variants (hamza-above, hamza-below, madda) to bare Alef
/// 2. Alef-maksura to Yaa
/// 3. Taa-marbuta to Haa
/// 4. Persian letters to their Arabic equivalents
/// 5. Diacritics (harakat, shadda, sukun) and Tatweel stripped
/// 6. Letter elongation reduced (runs of 3+ identical letters to 2)
/// 7. Whitespace runs collapsed to single spaces, ends trimmed
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run_char: Option<char> = None;
    let mut run_len = 0usize;
    let mut pending_space = false;

    for raw in text.chars() {
        let c = fold_char(raw);

        if is_stripped(c) {
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            run_char = None;
            run_len = 0;
            continue;
        }

        if pending_space {
            if !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
        }

        if run_char == Some(c) {
            run_len += 1;
            if run_len > 2 {
                continue;
            }
        } else {
            run_char = Some(c);
            run_len = 1;
        }

        out.push(c);
    }

    out
}

/// Fold orthographic variants to their canonical letter.
fn fold_char(c: char) -> char {
    match c {
        // Alef with madda, hamza above, hamza below
        '\u{0622}' | '\u{0623}' | '\u{0625}' => '\u{0627}',
        // Alef-maksura
        '\u{0649}' => '\u{064A}',
        // Taa-marbuta
        '\u{0629}' => '\u{0647}',
        // Persian letters occasionally pasted into Arabic text
        '\u{06AF}' => '\u{0643}', // gaf -> kaf
        '\u{0686}' => '\u{062C}', // tcheh -> jeem
        '\u{067E}' => '\u{0628}', // peh -> beh
        '\u{0698}' => '\u{0632}', // jeh -> zain
        _ => c,
    }
}

/// Characters removed outright: diacritics, Quranic annotation marks,
/// the superscript Alef, and the Tatweel elongation character.
fn is_stripped(c: char) -> bool {
    matches!(c,
        '\u{0610}'..='\u{061A}'
        | '\u{064B}'..='\u{0652}'
        | '\u{0670}'
        | '\u{0640}')
}
