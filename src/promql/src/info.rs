//! Serializable snapshots of builder state

use serde::{Deserialize, Serialize};

/// Everything a [`QueryBuilder`](crate::builder::QueryBuilder) knows about its query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryInfo {
    pub metric_name: Option<String>,
    pub labels: Vec<LabelInfo>,
    pub range_window: Option<String>,
    pub offset: Option<String>,
    pub functions: Vec<FunctionInfo>,
    pub arithmetic_ops: Vec<OperationInfo>,
    pub binary_ops: Vec<OperationInfo>,
    /// Query rendered from the structured state
    pub full_query: Option<String>,
    /// Original input, if unchanged since parsing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    pub decomposed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub name: String,
    pub value: String,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub args: Vec<String>,
    pub group_by: Vec<String>,
    pub without: Vec<String>,
}

/// An arithmetic or binary operation as operator and right-hand side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub operator: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use crate::builder::QueryBuilder;

    #[test]
    fn test_query_info_serializes_to_json() {
        let builder = QueryBuilder::parse(r#"sum(rate(x{job="api"}[5m])) by (job) > 10"#).unwrap();
        let json = serde_json::to_value(builder.info()).unwrap();

        assert_eq!(json["metric_name"], "x");
        assert_eq!(json["labels"][0]["operator"], "=");
        assert_eq!(json["functions"][1]["name"], "sum");
        assert_eq!(json["functions"][1]["group_by"][0], "job");
        assert_eq!(json["binary_ops"][0]["operator"], ">");
        assert_eq!(json["binary_ops"][0]["value"], "10");
        assert_eq!(json["raw_text"], r#"sum(rate(x{job="api"}[5m])) by (job) > 10"#);
        assert_eq!(json["decomposed"], true);
    }

    #[test]
    fn test_raw_text_omitted_after_mutation() {
        let mut builder = QueryBuilder::parse("up").unwrap();
        builder.with_label("job", "api").unwrap();
        let json = serde_json::to_value(builder.info()).unwrap();
        assert!(json.get("raw_text").is_none());
        assert_eq!(json["full_query"], r#"up{job="api"}"#);
    }
}
