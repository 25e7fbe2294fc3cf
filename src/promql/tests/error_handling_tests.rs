//! Error reporting for malformed queries and invalid builder input

use promql::parser::{ParserOptions, parse_with};
use promql::{BuilderOptions, LexError, ParseError, PromQLError, QueryBuilder, parse, validate};

#[test]
fn test_lexer_errors_report_position() {
    assert_eq!(
        parse("up{job=\"api}").unwrap_err(),
        ParseError::Lex(LexError::UnterminatedString { position: 7 })
    );
    assert_eq!(
        parse("up # comment").unwrap_err(),
        ParseError::Lex(LexError::UnexpectedCharacter {
            character: '#',
            position: 3
        })
    );
}

#[test]
fn test_unbalanced_delimiters() {
    for query in ["sum(rate(x[5m])", "rate(x[5m]))", "up{job=\"a\"", "(up", "x[5m"] {
        assert!(parse(query).is_err(), "{query} should fail to parse");
    }
}

#[test]
fn test_malformed_matchers() {
    let cases = [
        r#"up{="a"}"#,
        r#"up{job"a"}"#,
        r#"up{job==1}"#,
        r#"up{job="a" env="b"}"#,
        r#"up{job=~}"#,
    ];
    for query in cases {
        assert!(
            matches!(parse(query), Err(ParseError::UnexpectedToken { .. })),
            "{query} should report an unexpected token"
        );
    }
}

#[test]
fn test_invalid_durations() {
    assert!(matches!(
        parse("rate(x[5.5m])"),
        Err(ParseError::InvalidDuration { .. })
    ));
    assert!(matches!(
        parse("x offset 1.5h"),
        Err(ParseError::InvalidDuration { .. })
    ));
    assert!(matches!(
        parse("rate(x[5])"),
        Err(ParseError::UnexpectedToken { .. })
    ));
}

#[test]
fn test_dangling_operators() {
    assert_eq!(
        parse("up >").unwrap_err(),
        ParseError::UnexpectedEof {
            expected: "expression".to_string()
        }
    );
    assert!(parse("up + * 2").is_err());
    assert!(parse("> 5").is_err());
}

#[test]
fn test_error_messages_are_readable() {
    let err = parse("rate(x[])").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Expected duration at position 7, found ']' ']'"
    );

    let err: PromQLError = QueryBuilder::parse("vector(1)").unwrap_err().into();
    assert_eq!(
        err.to_string(),
        "PromQL parse error: Could not determine a metric selector from the query"
    );
}

#[test]
fn test_limits_apply_to_builder_parsing() {
    let options = ParserOptions {
        max_query_length: 8,
        ..Default::default()
    };
    assert_eq!(
        QueryBuilder::parse_with("http_requests_total", &options, BuilderOptions::default())
            .unwrap_err(),
        ParseError::QueryTooLong {
            length: 19,
            max: 8
        }
    );

    let nested = format!("{}up{}", "sum(".repeat(200), ")".repeat(200));
    assert_eq!(
        parse_with(&nested, &ParserOptions::default()).unwrap_err(),
        ParseError::NestingTooDeep { max: 128 }
    );
}

#[test]
fn test_validate_matches_parse() {
    for query in ["up", "sum(up) by (job)", "up{", "up +", "1 + 2"] {
        assert_eq!(validate(query).is_ok(), parse(query).is_ok(), "{query}");
    }
}
