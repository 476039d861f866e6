//! Parse schema source into AST using PEST.

use crate::ast::*;
use crate::error::SchemaParseError;
use pest::error::LineColLocation;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

/// Parse schema source into AST. Names are not resolved here; see [`ResolvedSchema::resolve`].
pub fn parse(source: &str) -> Result<Schema, SchemaParseError> {
    let pairs = SchemaParser::parse(Rule::schema, source).map_err(syntax_error)?;
    let pair = pairs.into_iter().next().ok_or(SchemaParseError::NoMessage)?;
    build_schema(pair)
}

/// Parse and resolve in one step.
pub fn parse_resolved(source: &str) -> Result<ResolvedSchema, SchemaParseError> {
    ResolvedSchema::resolve(parse(source)?)
}

fn syntax_error(e: pest::error::Error<Rule>) -> SchemaParseError {
    let (line, column) = match e.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    SchemaParseError::Syntax {
        line,
        column,
        message: e.variant.message().into_owned(),
    }
}

fn build_schema(pair: pest::iterators::Pair<Rule>) -> Result<Schema, SchemaParseError> {
    let mut syntax = Syntax::default();
    let mut package = None;
    let mut messages = Vec::new();
    let mut enums = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::syntax_decl => syntax = build_syntax(inner)?,
            Rule::package_decl => {
                package = inner
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::full_ident)
                    .map(|p| p.as_str().to_string());
            }
            Rule::message_decl => messages.push(build_message(inner)?),
            Rule::enum_decl => enums.push(build_enum(inner)?),
            _ => {}
        }
    }

    Ok(Schema {
        syntax,
        package,
        messages,
        enums,
    })
}

fn build_syntax(pair: pest::iterators::Pair<Rule>) -> Result<Syntax, SchemaParseError> {
    let lit = pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::string_lit)
        .map(|p| unquote(p.as_str()))
        .unwrap_or_default();
    match lit.as_str() {
        "proto2" => Ok(Syntax::Proto2),
        "proto3" => Ok(Syntax::Proto3),
        _ => Err(SchemaParseError::UnsupportedSyntax(lit)),
    }
}

fn build_message(pair: pest::iterators::Pair<Rule>) -> Result<MessageDecl, SchemaParseError> {
    let mut msg = MessageDecl::new("");
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => msg.name = inner.as_str().to_string(),
            Rule::field_decl => msg.fields.push(build_field(inner)),
            Rule::oneof_decl => {
                // Oneof members are plain optional fields of the enclosing message.
                for member in inner.into_inner() {
                    if member.as_rule() == Rule::oneof_field {
                        msg.fields.push(build_field(member));
                    }
                }
            }
            Rule::message_decl => msg.nested.push(build_message(inner)?),
            Rule::enum_decl => msg.enums.push(build_enum(inner)?),
            _ => {}
        }
    }
    Ok(msg)
}

/// Builds both `field_decl` and `oneof_field`; the latter has no label.
fn build_field(pair: pest::iterators::Pair<Rule>) -> FieldDecl {
    let mut label = Label::Implicit;
    let mut type_name = String::new();
    let mut name = String::new();
    let mut number = 0;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::label => {
                label = match inner.as_str() {
                    "required" => Label::Required,
                    "repeated" => Label::Repeated,
                    _ => Label::Optional,
                }
            }
            Rule::type_ref => type_name = inner.as_str().to_string(),
            Rule::ident => name = inner.as_str().to_string(),
            Rule::int_lit => number = parse_int(inner.as_str()).unwrap_or(u64::MAX),
            _ => {}
        }
    }
    FieldDecl {
        label,
        type_name,
        name,
        number,
    }
}

fn build_enum(pair: pest::iterators::Pair<Rule>) -> Result<EnumDecl, SchemaParseError> {
    let mut name = String::new();
    let mut values = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::enum_value => {
                let mut it = inner.into_inner();
                let value_name = it.next().map(|p| p.as_str().to_string()).unwrap_or_default();
                let value = it
                    .next()
                    .and_then(|p| parse_signed(p.as_str()))
                    .ok_or_else(|| SchemaParseError::Syntax {
                        line: 0,
                        column: 0,
                        message: format!("enum {}: value {} out of range", name, value_name),
                    })?;
                values.push((value_name, value));
            }
            _ => {}
        }
    }
    Ok(EnumDecl { name, values })
}

fn parse_int(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn parse_signed(s: &str) -> Option<i64> {
    match s.strip_prefix('-') {
        Some(rest) => {
            let v = parse_int(rest)?;
            if v == 1 << 63 {
                Some(i64::MIN)
            } else {
                i64::try_from(v).ok().map(|v| -v)
            }
        }
        None => parse_int(s).and_then(|v| i64::try_from(v).ok()),
    }
}

fn unquote(s: &str) -> String {
    if s.len() >= 2 {
        s[1..s.len() - 1].to_string()
    } else {
        String::new()
    }
}
