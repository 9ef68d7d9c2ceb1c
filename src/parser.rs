//! Parses textual statements into typed calls for the storage manager.
//!
//! The grammar lives in `sql.pest`.  WHERE clauses and UPDATE assignments
//! keep their operand text verbatim; the expression evaluator owns that
//! syntax.

use crate::condition::{self, Condition};
use crate::dtype::DataType;
use crate::record::Record;
use crate::schema::{Attribute, Schema};
use crate::value::{strip_quotes, Value};
use pest::iterators::Pair;
use pest::Parser;

#[derive(Parser)]
#[grammar = "sql.pest"]
pub struct SqlParser;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("syntax error:\n{0}")]
    Syntax(Box<pest::error::Error<Rule>>),
    #[error("varchar column {0} needs a declared size")]
    MissingSize(String),
    #[error("column {column} has invalid size {size}")]
    BadSize { column: String, size: String },
    #[error("integer literal {0} is out of range")]
    IntOutOfRange(String),
    #[error(transparent)]
    Condition(#[from] condition::Error),
    #[error("row has {got} values but the schema has {want} columns")]
    Arity { got: usize, want: usize },
    #[error("value {value} does not fit column {column} ({dtype})")]
    BadValue {
        value: String,
        column: String,
        dtype: DataType,
    },
}

impl From<pest::error::Error<Rule>> for Error {
    fn from(e: pest::error::Error<Rule>) -> Error {
        Error::Syntax(Box::new(e))
    }
}

/// A literal from an INSERT values list, before schema typing.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Num(f64),
    Str(String),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Num(v) => write!(f, "{}", v),
            Literal::Str(v) => write!(f, "'{}'", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Create {
        table: String,
        schema: Schema,
    },
    /// An empty column list means `SELECT *`.
    Select {
        table: String,
        columns: Vec<String>,
        condition: Option<Condition>,
    },
    Insert {
        table: String,
        rows: Vec<Vec<Literal>>,
    },
    Update {
        table: String,
        assignments: Vec<(String, String)>,
        condition: Option<Condition>,
    },
    Delete {
        table: String,
        condition: Option<Condition>,
    },
    Schema {
        table: String,
    },
    Stats,
}

pub fn parse_statement(input: &str) -> Result<Statement, Error> {
    let statement = SqlParser::parse(Rule::statement, input)?
        .next()
        .unwrap();
    let inner = statement.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::create_stmt => parse_create(inner),
        Rule::select_stmt => parse_select(inner),
        Rule::insert_stmt => parse_insert(inner),
        Rule::update_stmt => parse_update(inner),
        Rule::delete_stmt => parse_delete(inner),
        Rule::schema_stmt => Ok(Statement::Schema {
            table: inner.into_inner().next().unwrap().as_str().to_string(),
        }),
        Rule::stats_stmt => Ok(Statement::Stats),
        _ => unreachable!(),
    }
}

fn parse_create(pair: Pair<'_, Rule>) -> Result<Statement, Error> {
    let mut inner = pair.into_inner();
    let table = inner.next().unwrap().as_str().to_string();
    let mut attributes = vec![];
    for def in inner.next().unwrap().into_inner() {
        let mut parts = def.into_inner();
        let name = parts.next().unwrap().as_str().to_string();
        let dtype: DataType = parts
            .next()
            .unwrap()
            .as_str()
            .parse()
            .expect("grammar only admits supported type names");
        let size = match parts.next() {
            Some(spec) => {
                let text = spec.into_inner().next().unwrap().as_str();
                text.parse::<u16>().map_err(|_| Error::BadSize {
                    column: name.clone(),
                    size: text.to_string(),
                })?
            }
            None if dtype == DataType::VarChar => return Err(Error::MissingSize(name)),
            None => 0,
        };
        attributes.push(Attribute::new(name, dtype, size));
    }
    Ok(Statement::Create {
        table,
        schema: Schema::new(attributes),
    })
}

fn parse_select(pair: Pair<'_, Rule>) -> Result<Statement, Error> {
    let mut inner = pair.into_inner();
    let items = inner.next().unwrap().into_inner().next().unwrap();
    let columns = match items.as_rule() {
        Rule::star => vec![],
        Rule::column_list => items
            .into_inner()
            .map(|p| p.as_str().to_string())
            .collect(),
        _ => unreachable!(),
    };
    let table = inner.next().unwrap().as_str().to_string();
    let condition = inner.next().map(parse_where).transpose()?;
    Ok(Statement::Select {
        table,
        columns,
        condition,
    })
}

fn parse_insert(pair: Pair<'_, Rule>) -> Result<Statement, Error> {
    let mut inner = pair.into_inner();
    let table = inner.next().unwrap().as_str().to_string();
    let mut rows = vec![];
    for value_list in inner.next().unwrap().into_inner() {
        let mut row = vec![];
        for literal in value_list.into_inner() {
            row.push(parse_literal(literal)?);
        }
        rows.push(row);
    }
    Ok(Statement::Insert { table, rows })
}

fn parse_update(pair: Pair<'_, Rule>) -> Result<Statement, Error> {
    let mut inner = pair.into_inner();
    let table = inner.next().unwrap().as_str().to_string();
    let mut assignments = vec![];
    for assignment in inner.next().unwrap().into_inner() {
        let mut parts = assignment.into_inner();
        let column = parts.next().unwrap().as_str().to_string();
        let expression = parts.next().unwrap().as_str().trim().to_string();
        assignments.push((column, expression));
    }
    let condition = inner.next().map(parse_where).transpose()?;
    Ok(Statement::Update {
        table,
        assignments,
        condition,
    })
}

fn parse_delete(pair: Pair<'_, Rule>) -> Result<Statement, Error> {
    let mut inner = pair.into_inner();
    let table = inner.next().unwrap().as_str().to_string();
    let condition = inner.next().map(parse_where).transpose()?;
    Ok(Statement::Delete { table, condition })
}

fn parse_where(pair: Pair<'_, Rule>) -> Result<Condition, Error> {
    let cond = pair.into_inner().next().unwrap();
    let mut parts = cond.into_inner();
    let left = parts.next().unwrap().as_str().trim();
    let op = parts.next().unwrap().as_str();
    let right = parts.next().unwrap().as_str().trim();
    Ok(Condition::new(left, op, right)?)
}

fn parse_literal(pair: Pair<'_, Rule>) -> Result<Literal, Error> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::integer_literal => inner
            .as_str()
            .parse::<i64>()
            .map(Literal::Int)
            .map_err(|_| Error::IntOutOfRange(inner.as_str().to_string())),
        Rule::decimal_literal => Ok(Literal::Num(
            inner
                .as_str()
                .parse()
                .expect("digits with one dot always parse"),
        )),
        Rule::single_quoted_string => Ok(Literal::Str(strip_quotes(inner.as_str()).to_string())),
        _ => unreachable!(),
    }
}

/// Type an INSERT row against the table's schema.
pub fn typed_row(schema: &Schema, literals: &[Literal]) -> Result<Record, Error> {
    if literals.len() != schema.len() {
        return Err(Error::Arity {
            got: literals.len(),
            want: schema.len(),
        });
    }
    let mut record = Vec::with_capacity(literals.len());
    for (attr, literal) in schema.attributes.iter().zip(literals) {
        let bad_value = || Error::BadValue {
            value: literal.to_string(),
            column: attr.name.clone(),
            dtype: attr.dtype,
        };
        let value = match (attr.dtype, literal) {
            (DataType::Int, Literal::Int(v)) => {
                Value::Int(i32::try_from(*v).map_err(|_| bad_value())?)
            }
            (DataType::Float, Literal::Int(v)) => Value::Float(*v as f32),
            (DataType::Float, Literal::Num(v)) => Value::Float(*v as f32),
            (DataType::Char, Literal::Str(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(bad_value()),
                }
            }
            (DataType::VarChar, Literal::Str(s)) => Value::VarChar(s.clone()),
            _ => return Err(bad_value()),
        };
        record.push(value);
    }
    Ok(record)
}

#[test]
fn test_parse_create_statement() {
    let actual = parse_statement("CREATE TABLE t (id int, ratio float, grade char, name varchar(50))")
        .expect("Should have parsed statement.");
    let expected = Statement::Create {
        table: "t".to_string(),
        schema: Schema::new(vec![
            Attribute::new("id", DataType::Int, 0),
            Attribute::new("ratio", DataType::Float, 0),
            Attribute::new("grade", DataType::Char, 0),
            Attribute::new("name", DataType::VarChar, 50),
        ]),
    };
    assert_eq!(actual, expected);
}

#[test]
fn test_parse_create_requires_varchar_size() {
    assert!(matches!(
        parse_statement("CREATE TABLE t (name varchar)"),
        Err(Error::MissingSize(_))
    ));
}

#[test]
fn test_parse_select_statements() {
    assert_eq!(
        parse_statement("SELECT * FROM t").unwrap(),
        Statement::Select {
            table: "t".to_string(),
            columns: vec![],
            condition: None,
        }
    );
    assert_eq!(
        parse_statement("select id, name fRoM t WHERE id = 2").unwrap(),
        Statement::Select {
            table: "t".to_string(),
            columns: vec!["id".to_string(), "name".to_string()],
            condition: Some(Condition::new("id", "=", "2").unwrap()),
        }
    );
    assert_eq!(
        parse_statement("SELECT * FROM u WHERE age >= 20").unwrap(),
        Statement::Select {
            table: "u".to_string(),
            columns: vec![],
            condition: Some(Condition::new("age", ">=", "20").unwrap()),
        }
    );
}

#[test]
fn test_parse_insert_statement() {
    let actual = parse_statement("INSERT INTO t VALUES (1, 'Alice', 2.5), (-2, 'Bob', 0.5)")
        .expect("Should have parsed statement.");
    let expected = Statement::Insert {
        table: "t".to_string(),
        rows: vec![
            vec![
                Literal::Int(1),
                Literal::Str("Alice".to_string()),
                Literal::Num(2.5),
            ],
            vec![
                Literal::Int(-2),
                Literal::Str("Bob".to_string()),
                Literal::Num(0.5),
            ],
        ],
    };
    assert_eq!(actual, expected);
}

#[test]
fn test_parse_update_statement() {
    let actual = parse_statement("UPDATE u SET age = age ^ (5 - 3) - 100, name = 'x' WHERE id = 4")
        .expect("Should have parsed statement.");
    let expected = Statement::Update {
        table: "u".to_string(),
        assignments: vec![
            ("age".to_string(), "age ^ (5 - 3) - 100".to_string()),
            ("name".to_string(), "'x'".to_string()),
        ],
        condition: Some(Condition::new("id", "=", "4").unwrap()),
    };
    assert_eq!(actual, expected);
}

#[test]
fn test_parse_delete_statement() {
    assert_eq!(
        parse_statement("DELETE FROM u WHERE age >= 20").unwrap(),
        Statement::Delete {
            table: "u".to_string(),
            condition: Some(Condition::new("age", ">=", "20").unwrap()),
        }
    );
    assert_eq!(
        parse_statement("DELETE FROM u").unwrap(),
        Statement::Delete {
            table: "u".to_string(),
            condition: None,
        }
    );
}

#[test]
fn test_parse_schema_and_stats() {
    assert_eq!(
        parse_statement("SCHEMA t").unwrap(),
        Statement::Schema {
            table: "t".to_string()
        }
    );
    assert_eq!(parse_statement("stats").unwrap(), Statement::Stats);
}

#[test]
fn test_parse_rejects_garbage() {
    assert!(parse_statement("EXPLAIN t").is_err());
    assert!(parse_statement("SELECT FROM t").is_err());
    assert!(parse_statement("").is_err());
}

#[test]
fn test_typed_row() {
    let schema = Schema::new(vec![
        Attribute::new("id", DataType::Int, 4),
        Attribute::new("grade", DataType::Char, 1),
        Attribute::new("name", DataType::VarChar, 50),
    ]);
    let row = typed_row(
        &schema,
        &[
            Literal::Int(1),
            Literal::Str("b".to_string()),
            Literal::Str("Alice".to_string()),
        ],
    )
    .expect("Should have typed row.");
    assert_eq!(
        row,
        vec![
            Value::Int(1),
            Value::Char('b'),
            Value::VarChar("Alice".to_string()),
        ]
    );

    // Arity and type violations surface as errors.
    assert!(matches!(
        typed_row(&schema, &[Literal::Int(1)]),
        Err(Error::Arity { got: 1, want: 3 })
    ));
    assert!(matches!(
        typed_row(
            &schema,
            &[
                Literal::Str("x".to_string()),
                Literal::Str("b".to_string()),
                Literal::Str("Alice".to_string()),
            ]
        ),
        Err(Error::BadValue { .. })
    ));
    assert!(matches!(
        typed_row(
            &schema,
            &[
                Literal::Int(5_000_000_000),
                Literal::Str("b".to_string()),
                Literal::Str("Alice".to_string()),
            ]
        ),
        Err(Error::BadValue { .. })
    ));
}
