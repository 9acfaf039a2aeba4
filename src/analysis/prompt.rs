//! Instructions sent to the oracle by both providers.

use super::dto::InputKind;

const RESPONSE_SHAPE: &str = r#"Respond with a single JSON object and nothing else:
{"name": string, "calories": number, "protein": number, "carbs": number, "fat": number, "sugar": number, "confidence": number}
calories are kcal for the whole portion; protein, carbs, fat and sugar are grams."#;

const CONFIDENCE_POLICY: &str = "confidence is 0-100. If the input is plausibly food, \
report a high confidence (90 or more) even when the portion is a rough guess. \
Report 0 only when the input is definitively not food or is corrupt or unreadable. \
Do not use values in between.";

pub fn instructions(kind: InputKind) -> String {
    let task = match kind {
        InputKind::Image => {
            "Identify the meal in this photo and estimate its nutrition for the visible portion."
        }
        InputKind::Text => {
            "Estimate the nutrition of the meal described by the user for a typical portion."
        }
    };
    format!("{task}\n{RESPONSE_SHAPE}\n{CONFIDENCE_POLICY}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_kinds_carry_the_confidence_policy() {
        for kind in [InputKind::Image, InputKind::Text] {
            let text = instructions(kind);
            assert!(text.contains("definitively not food"));
            assert!(text.contains("\"confidence\": number"));
        }
        assert!(instructions(InputKind::Image).contains("photo"));
        assert!(instructions(InputKind::Text).contains("described"));
    }
}
