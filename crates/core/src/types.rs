//! 도메인 타입 — 엔진 간에 공유되는 탐지 결과와 실행 규칙
//!
//! - [`DetectedFeature`]: 엔진이 보고한 단일 탐지 결과 (이름 기준 병합 가능)
//! - [`FeatureSet`]: 실행 중 누적되는 탐지 결과 집합 (추가/병합만 허용)
//! - [`RunRules`]: 엔진 실행 전제 조건 (선행 엔진, 선행 탐지 기능)
//! - [`RunHistory`]: 현재 실행에서 지금까지 관측된 상태

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// 엔진이 탐지한 기능 (언어, 프레임워크, 라이브러리 등)
///
/// `name`이 식별 키입니다. 같은 이름의 두 기능은 [`DetectedFeature::merge`]로
/// 하나로 합쳐집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFeature {
    /// 기능 이름 (식별 키)
    pub name: String,
    /// 탐지된 버전
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// 설명
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// CPE 식별자
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpe: Option<String>,
    /// 분류 목록
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// 이 기능을 보고한 엔진 이름 목록
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub engines: Vec<String>,
    /// 엔진별 추가 정보
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl DetectedFeature {
    /// 이름만 가진 기능을 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            cpe: None,
            categories: Vec::new(),
            engines: Vec::new(),
            meta: Map::new(),
        }
    }

    /// 보고한 엔진을 추가합니다.
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        push_unique(&mut self.engines, engine.into());
        self
    }

    /// 분류를 추가합니다.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        push_unique(&mut self.categories, category.into());
        self
    }

    /// 버전을 설정합니다.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// 같은 이름의 기능을 합칩니다.
    ///
    /// - 목록 필드(`categories`, `engines`)는 순서를 유지한 합집합
    /// - 스칼라 필드는 먼저 채워진 값을 유지하고, 비어 있으면 `other`의 값을 사용
    /// - `meta`는 키 합집합 (충돌 시 기존 값 유지)
    ///
    /// 이름이 다르면 아무것도 하지 않습니다.
    pub fn merge(&mut self, other: DetectedFeature) {
        if self.name != other.name {
            return;
        }

        if self.version.is_none() {
            self.version = other.version;
        }
        if self.description.is_none() {
            self.description = other.description;
        }
        if self.cpe.is_none() {
            self.cpe = other.cpe;
        }
        for category in other.categories {
            push_unique(&mut self.categories, category);
        }
        for engine in other.engines {
            push_unique(&mut self.engines, engine);
        }
        for (key, value) in other.meta {
            self.meta.entry(key).or_insert(value);
        }
    }
}

impl fmt::Display for DetectedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} {}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// 누적 탐지 결과 집합
///
/// 처음 관측된 순서를 유지하는 이름 → 기능 매핑입니다.
/// 실행 중에는 추가 또는 병합만 일어나며 줄어들지 않습니다.
/// 직렬화 형식은 JSON 배열입니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    features: Vec<DetectedFeature>,
}

impl FeatureSet {
    /// 빈 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기능 목록으로부터 집합을 생성합니다. 중복 이름은 병합됩니다.
    pub fn from_features(features: impl IntoIterator<Item = DetectedFeature>) -> Self {
        let mut set = Self::new();
        set.merge(features);
        set
    }

    /// 새로 보고된 기능 목록을 병합합니다.
    ///
    /// 기존 이름의 순서를 유지하고, 새 이름은 보고된 순서대로 뒤에 추가합니다.
    /// 양쪽에 모두 있는 이름은 [`DetectedFeature::merge`]로 합칩니다.
    pub fn merge(&mut self, new_features: impl IntoIterator<Item = DetectedFeature>) {
        for feature in new_features {
            match self.features.iter_mut().find(|f| f.name == feature.name) {
                Some(existing) => existing.merge(feature),
                None => self.features.push(feature),
            }
        }
    }

    /// 이름으로 기능을 조회합니다.
    pub fn get(&self, name: &str) -> Option<&DetectedFeature> {
        self.features.iter().find(|f| f.name == name)
    }

    /// 이름이 존재하는지 확인합니다.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 기능 이름을 순서대로 반환합니다.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    /// 기능을 순서대로 순회합니다.
    pub fn iter(&self) -> std::slice::Iter<'_, DetectedFeature> {
        self.features.iter()
    }

    /// 기능 수
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// 내부 목록을 꺼냅니다.
    pub fn into_vec(self) -> Vec<DetectedFeature> {
        self.features
    }
}

impl<'a> IntoIterator for &'a FeatureSet {
    type Item = &'a DetectedFeature;
    type IntoIter = std::slice::Iter<'a, DetectedFeature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

impl Serialize for FeatureSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.features.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FeatureSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<DetectedFeature>::deserialize(deserializer).map(Self::from_features)
    }
}

/// 엔진 실행 전제 조건
///
/// 두 목록 모두 비어 있으면 항상 실행 가능합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunRules {
    /// 먼저 실행되어야 하는 엔진 이름
    pub engines: Vec<String>,
    /// 먼저 탐지되어야 하는 기능 이름
    pub features: Vec<String>,
}

impl RunRules {
    /// 선행 엔진 규칙으로 생성합니다.
    pub fn after_engines<I, S>(engines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            engines: engines.into_iter().map(Into::into).collect(),
            features: Vec::new(),
        }
    }

    /// 선행 기능 규칙으로 생성합니다.
    pub fn after_features<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            engines: Vec::new(),
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    /// 규칙이 하나도 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty() && self.features.is_empty()
    }

    /// 현재 실행 상태가 규칙을 만족하는지 검사합니다.
    ///
    /// 선행 엔진 ⊆ 실행된 엔진, 선행 기능 ⊆ 탐지된 기능 두 조건이 모두 성립해야 합니다.
    pub fn satisfied_by(&self, history: &RunHistory) -> bool {
        if self.is_empty() {
            return true;
        }

        let engines_run = history.engines_run();
        let features_found: BTreeSet<&str> = history.features().names().collect();

        self.engines
            .iter()
            .all(|engine| engines_run.contains(engine.as_str()))
            && self
                .features
                .iter()
                .all(|feature| features_found.contains(feature.as_str()))
    }
}

/// 현재 실행에서 지금까지 관측된 상태
///
/// 실행 완료된 엔진 이름과 누적 탐지 결과를 보관합니다.
/// 오케스트레이터만 갱신하며, 엔진에는 스냅샷만 전달됩니다.
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    executed_engines: BTreeSet<String>,
    features: FeatureSet,
}

impl RunHistory {
    /// 빈 상태를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 실행된 엔진 이름 목록으로 생성합니다.
    pub fn with_engines<I, S>(engines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executed_engines: engines.into_iter().map(Into::into).collect(),
            features: FeatureSet::new(),
        }
    }

    /// 누적 탐지 결과로 생성합니다.
    pub fn with_features(features: FeatureSet) -> Self {
        Self {
            executed_engines: BTreeSet::new(),
            features,
        }
    }

    /// 엔진 실행 완료를 기록합니다.
    pub fn record_engine(&mut self, name: impl Into<String>) {
        self.executed_engines.insert(name.into());
    }

    /// 엔진이 보고한 기능을 누적 집합에 병합합니다.
    pub fn merge_features(&mut self, features: impl IntoIterator<Item = DetectedFeature>) {
        self.features.merge(features);
    }

    /// 누적 탐지 결과
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// 누적 탐지 결과를 꺼냅니다.
    pub fn into_features(self) -> FeatureSet {
        self.features
    }

    /// 실행된 것으로 알려진 엔진 이름 집합
    ///
    /// 명시적으로 기록된 엔진과, 탐지 결과의 `engines` 필드에 등장한 엔진을 합칩니다.
    /// 엔진 출력의 `engines` 필드는 파싱 시 비워지므로 여기에는 러너가 기록한 이름만 남습니다.
    pub fn engines_run(&self) -> BTreeSet<&str> {
        self.executed_engines
            .iter()
            .map(String::as_str)
            .chain(
                self.features
                    .iter()
                    .flat_map(|f| f.engines.iter().map(String::as_str)),
            )
            .collect()
    }
}
