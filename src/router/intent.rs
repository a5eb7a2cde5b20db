use crate::db::DatabaseId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    TextToSql,
    GeneralQa,
    ToolWeather,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToSql => "text_to_sql",
            Self::GeneralQa => "general_qa",
            Self::ToolWeather => "tool_weather",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Intent {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "text_to_sql" | "sql" | "database" => Self::TextToSql,
            "tool_weather" | "weather" => Self::ToolWeather,
            _ => Self::GeneralQa,
        }
    }
}

pub const WAREHOUSE_TERMS: &[&str] = &[
    "库存",
    "商品",
    "产品",
    "仓库",
    "员工",
    "出入库",
    "供应商",
    "价格",
    "products",
    "inventory",
    "warehouse_staff",
    "shipments",
    "supplier",
    "price",
    "product",
    "stock",
    "warehouse",
    "shipment",
];

pub const HOSPITAL_TERMS: &[&str] = &[
    "医生",
    "病人",
    "患者",
    "诊疗",
    "诊断",
    "处方",
    "科室",
    "职称",
    "doctors",
    "patients",
    "medical_records",
    "department",
    "title",
    "doctor",
    "patient",
    "diagnosis",
    "prescription",
];

// Short tokens here match inside unrelated words ("stable" hits "table").
pub const GENERIC_QUERY_TERMS: &[&str] = &[
    "查询", "select", "记录", "信息", "query", "record", "sql", "table",
];

pub const WEATHER_TERMS: &[&str] = &[
    "天气",
    "weather",
    "温度",
    "湿度",
    "降水",
    "temperature",
    "humidity",
    "forecast",
];

fn mentions(question: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| question.contains(term))
}

fn normalize(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Keyword router. Matching is plain substring containment on the lower-cased question.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentRouter;

impl IntentRouter {
    pub fn new() -> Self {
        Self
    }

    /// Warehouse, hospital and generic terms route to SQL, checked in that order, then
    /// weather terms. Everything else is general QA.
    pub fn decide(&self, question: &str) -> Intent {
        let q = normalize(question);
        if mentions(&q, WAREHOUSE_TERMS)
            || mentions(&q, HOSPITAL_TERMS)
            || mentions(&q, GENERIC_QUERY_TERMS)
        {
            Intent::TextToSql
        } else if mentions(&q, WEATHER_TERMS) {
            Intent::ToolWeather
        } else {
            Intent::GeneralQa
        }
    }

    /// Database the question most likely targets, `None` when it cannot tell.
    pub fn suggest_database(&self, question: &str) -> Option<DatabaseId> {
        let q = normalize(question);
        if mentions(&q, WAREHOUSE_TERMS) {
            Some(DatabaseId::Warehouse)
        } else if mentions(&q, HOSPITAL_TERMS) {
            Some(DatabaseId::Hospital)
        } else {
            None
        }
    }
}
