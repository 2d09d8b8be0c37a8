//! 엔진 출력 파싱과 필터링
//!
//! 하나의 청크는 JSON 객체 하나입니다:
//!
//! ```text
//! {"type":"feature","name":"Ruby","version":"2.7","categories":["Language"]}
//! ```
//!
//! [`EngineOutput::parse`]는 청크를 검증된 기능 또는 에러 설명자로 변환하고,
//! [`EngineOutputFilter`]는 엔진 설정의 제외 규칙에 맞는 기능을 걸러냅니다.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde_json::Value;

use belugas_core::types::DetectedFeature;

/// 기능 출력의 `type` 값
pub const FEATURE_TYPE: &str = "feature";

/// 파싱 결과
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    /// 유효한 기능
    Feature(DetectedFeature),
    /// 검증 실패
    Invalid {
        /// 실패 사유
        message: String,
    },
}

/// 엔진 출력 청크 하나
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    raw: Bytes,
    parsed: ParsedOutput,
}

impl EngineOutput {
    /// 청크를 파싱합니다. 공백뿐인 청크는 `None`입니다.
    pub fn parse(raw: impl Into<Bytes>) -> Option<Self> {
        let raw = raw.into();
        if raw.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        let parsed = match parse_feature(&raw) {
            Ok(feature) => ParsedOutput::Feature(feature),
            Err(message) => ParsedOutput::Invalid { message },
        };
        Some(Self { raw, parsed })
    }

    /// 검증된 기능으로 직접 생성합니다.
    pub fn from_feature(feature: DetectedFeature) -> Self {
        let raw = serde_json::to_vec(&feature).unwrap_or_default();
        Self {
            raw: Bytes::from(raw),
            parsed: ParsedOutput::Feature(feature),
        }
    }

    /// 유효한 출력인지 여부
    pub fn is_valid(&self) -> bool {
        matches!(self.parsed, ParsedOutput::Feature(_))
    }

    /// 파싱 결과
    pub fn parsed(&self) -> &ParsedOutput {
        &self.parsed
    }

    /// 유효한 경우 기능
    pub fn feature(&self) -> Option<&DetectedFeature> {
        match &self.parsed {
            ParsedOutput::Feature(feature) => Some(feature),
            ParsedOutput::Invalid { .. } => None,
        }
    }

    /// 유효한 경우 기능 (소유권 이전)
    pub fn into_feature(self) -> Option<DetectedFeature> {
        match self.parsed {
            ParsedOutput::Feature(feature) => Some(feature),
            ParsedOutput::Invalid { .. } => None,
        }
    }

    /// 검증 실패 사유
    pub fn error_message(&self) -> Option<&str> {
        match &self.parsed {
            ParsedOutput::Feature(_) => None,
            ParsedOutput::Invalid { message } => Some(message),
        }
    }

    /// 원본 청크 (손실 허용 UTF-8)
    pub fn raw_text(&self) -> String {
        String::from_utf8_lossy(&self.raw).trim().to_owned()
    }

    /// 보고 엔진 목록에 엔진 이름을 추가합니다.
    pub fn attribute_to(mut self, engine: &str) -> Self {
        if let ParsedOutput::Feature(feature) = self.parsed {
            self.parsed = ParsedOutput::Feature(feature.with_engine(engine));
        }
        self
    }
}

fn parse_feature(raw: &[u8]) -> Result<DetectedFeature, String> {
    let text = std::str::from_utf8(raw).map_err(|e| format!("output is not valid UTF-8: {e}"))?;
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| format!("output is not valid JSON: {e}"))?;

    let Value::Object(mut object) = value else {
        return Err("output must be a JSON object".to_owned());
    };

    match object.remove("type") {
        Some(Value::String(kind)) if kind.eq_ignore_ascii_case(FEATURE_TYPE) => {}
        Some(Value::String(kind)) => return Err(format!("unsupported output type '{kind}'")),
        Some(_) => return Err("output type must be a string".to_owned()),
        None => return Err("output type is missing".to_owned()),
    }

    match object.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => {}
        Some(Value::String(_)) => return Err("feature name must not be empty".to_owned()),
        Some(_) => return Err("feature name must be a string".to_owned()),
        None => return Err("feature name is missing".to_owned()),
    }

    let mut feature: DetectedFeature =
        serde_json::from_value(Value::Object(object)).map_err(|e| format!("invalid feature: {e}"))?;
    // 기여 엔진은 러너가 attribute_to로만 기록한다
    feature.engines.clear();
    Ok(feature)
}

/// 엔진 설정 기반 출력 필터
///
/// 엔진 설정의 다음 항목으로 기능을 제외합니다:
///
/// ```json
/// {
///   "checks": { "jQuery": { "enabled": false } },
///   "exclude_features": ["Bower"]
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineOutputFilter {
    excluded: BTreeSet<String>,
}

impl EngineOutputFilter {
    /// 엔진 설정에서 필터를 생성합니다.
    pub fn new(config: &Value) -> Self {
        let mut excluded = BTreeSet::new();

        if let Some(checks) = config.get("checks").and_then(Value::as_object) {
            for (name, check) in checks {
                if check.get("enabled").and_then(Value::as_bool) == Some(false) {
                    excluded.insert(name.clone());
                }
            }
        }

        if let Some(names) = config.get("exclude_features").and_then(Value::as_array) {
            excluded.extend(names.iter().filter_map(Value::as_str).map(str::to_owned));
        }

        Self { excluded }
    }

    /// 걸러야 하는 출력인지 여부
    ///
    /// 잘못된 출력은 필터 대상이 아닙니다.
    pub fn filter(&self, output: &EngineOutput) -> bool {
        output
            .feature()
            .is_some_and(|feature| self.excluded.contains(&feature.name))
    }

    /// 제외 대상 기능 수
    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    /// 제외 규칙이 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}
