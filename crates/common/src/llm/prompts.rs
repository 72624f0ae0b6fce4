//! Prompt builders for clause correction and reference example generation

use serde_json::{Map, Value};

/// Keys a correction reply must carry
pub const CORRECTION_REPLY_KEYS: &[&str] =
    &["correctedText", "proofText", "violation_score", "incorrectPart"];

/// Keys a reference-example reply must carry
pub const STANDARD_EXAMPLE_KEYS: &[&str] = &["incorrect_text", "corrected_text"];

const CORRECTION_SYSTEM: &str = "당신은 계약서 조항을 검토하는 법률 전문가입니다. \
제공된 참고 자료에 근거해서만 판단하고, 결과는 JSON 객체 하나로만 답합니다.";

/// A reference neighbour handed to the correction prompt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceExample {
    pub incorrect_text: String,
    pub corrected_text: String,
    pub proof_text: String,
    pub term_explanation: String,
    pub score: f32,
}

impl ReferenceExample {
    /// Read the fields written by standard ingestion; missing fields stay empty
    pub fn from_payload(payload: &Map<String, Value>, score: f32) -> Self {
        let field = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            incorrect_text: field("incorrect_text"),
            corrected_text: field("corrected_text"),
            proof_text: field("proof_text"),
            term_explanation: field("term_explanation"),
            score,
        }
    }
}

/// System message for correction calls
pub fn correction_system_prompt() -> &'static str {
    CORRECTION_SYSTEM
}

/// Ask for a verdict on one clause given its nearest reference examples
pub fn build_correction_prompt(clause_text: &str, references: &[ReferenceExample]) -> String {
    let mut prompt = format!(
        "다음 계약서 조항이 참고 자료에 비추어 법률을 위반하거나 불리한 내용을 포함하는지 검토해줘.\n\
         JSON 코드 블록을 사용하지 말고 JSON 객체만 한 줄로 반환해.\n\n\
         계약서 조항:\n\"\"\"\n{}\n\"\"\"\n\n참고 자료:\n",
        clause_text
    );

    for (i, reference) in references.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[{}] (유사도: {:.3})\n- 위반 예시: {}\n- 교정 예시: {}\n- 근거: {}\n",
            i + 1,
            reference.score,
            reference.incorrect_text,
            reference.corrected_text,
            reference.proof_text,
        ));
        if !reference.term_explanation.is_empty() {
            prompt.push_str(&format!("- 용어 설명: {}\n", reference.term_explanation));
        }
    }

    prompt.push_str(
        "\n[반환할 JSON 형식]\n\
         {\n\
           \"correctedText\": \"조항 전체를 교정한 문장\",\n\
           \"proofText\": \"참고 자료에 근거한 교정 이유\",\n\
           \"violation_score\": \"0과 1 사이의 위반 가능성 점수\",\n\
           \"incorrectPart\": \"원문에서 문제가 되는 부분을 그대로 발췌한 짧은 문장\"\n\
         }\n\n\
         조건:\n\
         - incorrectPart는 계약서 조항 원문에 그대로 존재하는 문자열이어야 함.\n\
         - 위반 소지가 없으면 violation_score를 낮게 주고 correctedText는 원문과 같게 작성.\n\
         - 설명이나 추가 텍스트 없이 JSON만 반환.",
    );
    prompt
}

/// Ask for a violating example and its correction for a reference clause
pub fn build_standard_example_prompt(clause_content: &str) -> String {
    format!(
        "다음 지시문에 맞게 반환해줘.\n\
         JSON 코드 블록을 사용하지 말고 JSON 객체만 한 줄로 반환해.\n\n\
         문서 원문:\n\"\"\"\n{}\n\"\"\"\n\n\
         [생성할 JSON 형식]\n\
         {{\n\
           \"incorrect_text\": \"문서 원문을 기준으로 법률을 위반할 수 있는 예시 문장\",\n\
           \"corrected_text\": \"위의 문장을 교정한 문장\"\n\
         }}\n\n\
         조건:\n\
         - 위반 문장과 교정 문장은 서로 논리적으로 연결되어야 함.\n\
         - 결과는 반드시 JSON만 반환. 설명, 추가 텍스트 없이.",
        clause_content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_from_payload() {
        let payload = json!({
            "incorrect_text": "임차인은 모든 수리비를 부담한다",
            "corrected_text": "임대인은 주요 설비의 수리비를 부담한다",
            "proof_text": "민법 제623조",
            "category": "lease"
        });
        let reference = ReferenceExample::from_payload(payload.as_object().unwrap(), 0.82);
        assert_eq!(reference.proof_text, "민법 제623조");
        assert!(reference.term_explanation.is_empty());
    }

    #[test]
    fn test_correction_prompt_lists_references_and_keys() {
        let references = vec![
            ReferenceExample {
                incorrect_text: "A".into(),
                proof_text: "근거1".into(),
                ..Default::default()
            },
            ReferenceExample {
                incorrect_text: "B".into(),
                proof_text: "근거2".into(),
                ..Default::default()
            },
        ];
        let prompt = build_correction_prompt("제1조 목적", &references);
        assert!(prompt.contains("제1조 목적"));
        assert!(prompt.contains("[2]"));
        for key in CORRECTION_REPLY_KEYS {
            assert!(prompt.contains(key));
        }
    }

    #[test]
    fn test_standard_prompt_mentions_keys() {
        let prompt = build_standard_example_prompt("임대인은 보증금을 반환한다");
        for key in STANDARD_EXAMPLE_KEYS {
            assert!(prompt.contains(key));
        }
    }
}
