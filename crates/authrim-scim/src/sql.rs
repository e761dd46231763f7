//! Filter AST -> parameterized SQL
//!
//! Compilation maps SCIM attribute paths through a static column table and
//! emits `?` placeholders exclusively; literal values never enter the SQL
//! text. Unmapped attributes fail with `invalidFilter`.

use crate::error::ScimError;
use crate::filter::{AttrPath, CompareOp, FilterNode, Literal, LogicalOp};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Real(f64),
    Bool(bool),
    Null,
}

/// A compiled WHERE clause plus its bind parameters, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<SqlParam>,
}

static USER_COLUMNS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("id", "id");
    m.insert("externalid", "external_id");
    m.insert("username", "preferred_username");
    m.insert("active", "active");
    m.insert("displayname", "name");
    m.insert("name.formatted", "name");
    m.insert("name.givenname", "given_name");
    m.insert("name.familyname", "family_name");
    m.insert("name.middlename", "middle_name");
    m.insert("nickname", "nickname");
    m.insert("profileurl", "profile");
    m.insert("emails", "email");
    m.insert("emails.value", "email");
    m.insert("phonenumbers", "phone_number");
    m.insert("phonenumbers.value", "phone_number");
    m.insert("locale", "locale");
    m.insert("timezone", "zoneinfo");
    m.insert("meta.created", "created_at");
    m.insert("meta.lastmodified", "updated_at");
    m
});

static GROUP_COLUMNS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("id", "id");
    m.insert("displayname", "display_name");
    m.insert("meta.created", "created_at");
    m.insert("meta.lastmodified", "updated_at");
    m
});

/// Which attribute->column table to compile against.
#[derive(Debug, Clone, Copy)]
pub enum ResourceTable {
    Users,
    Groups,
}

impl ResourceTable {
    fn column(&self, attr: &AttrPath) -> Result<&'static str, ScimError> {
        let key = attr
            .segments
            .iter()
            .map(|s| s.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(".");
        let table = match self {
            Self::Users => &*USER_COLUMNS,
            Self::Groups => &*GROUP_COLUMNS,
        };
        table.get(key.as_str()).copied().ok_or_else(|| {
            ScimError::invalid_filter(format!("attribute \"{}\" cannot be filtered", attr))
        })
    }
}

/// Compile a filter AST into a parameterized WHERE clause.
pub fn compile(node: &FilterNode, table: ResourceTable) -> Result<SqlFilter, ScimError> {
    let mut params = Vec::new();
    let clause = compile_node(node, table, &mut params)?;
    Ok(SqlFilter { clause, params })
}

/// Check every attribute in a filter AST against the column map without
/// emitting SQL. The in-memory search path enforces the same allow-list as
/// the compiled path this way: an unmapped attribute is `invalidFilter`
/// everywhere, never an empty result set.
pub fn validate_attributes(node: &FilterNode, table: ResourceTable) -> Result<(), ScimError> {
    match node {
        FilterNode::Logical { children, .. } => {
            for child in children {
                validate_attributes(child, table)?;
            }
            Ok(())
        }
        FilterNode::Not { child } => validate_attributes(child, table),
        FilterNode::Present { attr } | FilterNode::Compare { attr, .. } => {
            table.column(attr).map(|_| ())
        }
    }
}

fn compile_node(
    node: &FilterNode,
    table: ResourceTable,
    params: &mut Vec<SqlParam>,
) -> Result<String, ScimError> {
    match node {
        FilterNode::Logical { op, children } => {
            let glue = match op {
                LogicalOp::And => " AND ",
                LogicalOp::Or => " OR ",
            };
            let parts: Result<Vec<String>, ScimError> = children
                .iter()
                .map(|c| compile_node(c, table, params))
                .collect();
            Ok(format!("({})", parts?.join(glue)))
        }
        FilterNode::Not { child } => {
            let inner = compile_node(child, table, params)?;
            Ok(format!("NOT ({})", inner))
        }
        FilterNode::Present { attr } => {
            let column = table.column(attr)?;
            Ok(format!("{} IS NOT NULL", column))
        }
        FilterNode::Compare { attr, op, value } => {
            let column = table.column(attr)?;
            match op {
                CompareOp::Co | CompareOp::Sw | CompareOp::Ew => {
                    let Literal::Str(s) = value else {
                        return Err(ScimError::invalid_filter(
                            "co/sw/ew require a string literal",
                        ));
                    };
                    let pattern = match op {
                        CompareOp::Co => format!("%{}%", escape_like(s)),
                        CompareOp::Sw => format!("{}%", escape_like(s)),
                        CompareOp::Ew => format!("%{}", escape_like(s)),
                        _ => unreachable!(),
                    };
                    params.push(SqlParam::Text(pattern));
                    Ok(format!("{} LIKE ? ESCAPE '\\'", column))
                }
                _ => {
                    if matches!(value, Literal::Null) {
                        return Ok(match op {
                            CompareOp::Eq => format!("{} IS NULL", column),
                            CompareOp::Ne => format!("{} IS NOT NULL", column),
                            _ => {
                                return Err(ScimError::invalid_filter(
                                    "null only supports eq/ne",
                                ))
                            }
                        });
                    }
                    params.push(match value {
                        Literal::Str(s) => SqlParam::Text(s.clone()),
                        Literal::Num(n) => SqlParam::Real(*n),
                        Literal::Bool(b) => SqlParam::Bool(*b),
                        Literal::Null => unreachable!(),
                    });
                    let operator = match op {
                        CompareOp::Eq => "=",
                        CompareOp::Ne => "<>",
                        CompareOp::Gt => ">",
                        CompareOp::Ge => ">=",
                        CompareOp::Lt => "<",
                        CompareOp::Le => "<=",
                        _ => unreachable!(),
                    };
                    Ok(format!("{} {} ?", column, operator))
                }
            }
        }
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse;

    #[test]
    fn simple_equality_compiles_to_placeholder() {
        let ast = parse(r#"userName eq "jdoe""#).unwrap();
        let sql = compile(&ast, ResourceTable::Users).unwrap();
        assert_eq!(sql.clause, "preferred_username = ?");
        assert_eq!(sql.params, vec![SqlParam::Text("jdoe".to_string())]);
    }

    #[test]
    fn contains_produces_escaped_like() {
        let ast = parse(r#"emails co "50%_off""#).unwrap();
        let sql = compile(&ast, ResourceTable::Users).unwrap();
        assert_eq!(sql.clause, "email LIKE ? ESCAPE '\\'");
        assert_eq!(
            sql.params,
            vec![SqlParam::Text("%50\\%\\_off%".to_string())]
        );
    }

    #[test]
    fn boolean_logic_nests_with_parens() {
        let ast = parse(r#"active eq true and (userName sw "j" or emails co "corp")"#).unwrap();
        let sql = compile(&ast, ResourceTable::Users).unwrap();
        assert_eq!(
            sql.clause,
            "(active = ? AND (preferred_username LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\'))"
        );
        assert_eq!(sql.params.len(), 3);
        assert_eq!(sql.params[0], SqlParam::Bool(true));
    }

    #[test]
    fn injection_text_stays_in_parameters() {
        let ast = parse(r#"userName eq "x\" OR 1=1 --""#).unwrap();
        let sql = compile(&ast, ResourceTable::Users).unwrap();
        assert_eq!(sql.clause, "preferred_username = ?");
        assert_eq!(
            sql.params,
            vec![SqlParam::Text("x\" OR 1=1 --".to_string())]
        );
    }

    #[test]
    fn unmapped_attribute_is_invalid_filter() {
        let ast = parse(r#"password eq "hunter2""#).unwrap();
        let err = compile(&ast, ResourceTable::Users).unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.scim_type, Some("invalidFilter"));
    }

    #[test]
    fn group_table_maps_display_name() {
        let ast = parse(r#"displayName eq "engineering""#).unwrap();
        let sql = compile(&ast, ResourceTable::Groups).unwrap();
        assert_eq!(sql.clause, "display_name = ?");
    }

    #[test]
    fn validation_walks_nested_expressions() {
        let ok = parse(r#"active eq true and (userName sw "j" or not (emails pr))"#).unwrap();
        assert!(validate_attributes(&ok, ResourceTable::Users).is_ok());

        let bad = parse(r#"active eq true and secretColumn pr"#).unwrap();
        let err = validate_attributes(&bad, ResourceTable::Users).unwrap_err();
        assert_eq!(err.scim_type, Some("invalidFilter"));
    }
}
