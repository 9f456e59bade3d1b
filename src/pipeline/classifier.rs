/// 化验单常见项目（小写）
pub const CLINICAL_MARKERS: &[&str] = &[
    "hemoglobina",
    "leucocitos",
    "plaquetas",
    "colesterol",
    "urea",
    "biometría",
    "química sanguínea",
    "glucosa",
    "hematocrito",
    "eritrocitos",
    "tsh",
    "hdl",
    "ldl",
];

/// 小写后包含任一关键词即视为化验单
pub fn classify(text: &str) -> bool {
    let normalized = text.to_lowercase();
    CLINICAL_MARKERS
        .iter()
        .any(|marker| normalized.contains(marker))
}
