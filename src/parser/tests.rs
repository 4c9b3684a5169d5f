use crate::ast::*;
use crate::error::SqlTmplError;
use crate::parser::parse;

fn field(path: &[&str]) -> Expr {
    Expr::Field(path.iter().map(|s| s.to_string()).collect())
}

fn var(name: &str) -> Expr {
    Expr::Variable {
        name: name.to_string(),
        path: vec![],
    }
}

fn single(expr: Expr) -> Pipeline {
    Pipeline {
        cmds: vec![Command { args: vec![expr] }],
        ..Default::default()
    }
}

fn parse_err(source: &str) -> (usize, String) {
    match parse(source) {
        Err(SqlTmplError::Parse { position, message }) => (position, message),
        other => panic!("expected parse error for {:?}, got {:?}", source, other),
    }
}

#[test]
fn test_text_and_actions() {
    let nodes = parse("SELECT * FROM users WHERE id = {{ .Id }}").unwrap();
    assert_eq!(
        nodes,
        vec![
            Node::Text("SELECT * FROM users WHERE id = ".into()),
            Node::Action(single(field(&["Id"]))),
        ]
    );
}

#[test]
fn test_empty_source() {
    assert_eq!(parse("").unwrap(), vec![]);
}

#[test]
fn test_dot_and_nested_field() {
    let nodes = parse("{{.}}{{.User.Name}}").unwrap();
    assert_eq!(
        nodes,
        vec![
            Node::Action(single(Expr::Dot)),
            Node::Action(single(field(&["User", "Name"]))),
        ]
    );
}

#[test]
fn test_trim_markers() {
    let nodes = parse("a  \n {{- .A -}} \t b").unwrap();
    assert_eq!(
        nodes,
        vec![
            Node::Text("a".into()),
            Node::Action(single(field(&["A"]))),
            Node::Text("b".into()),
        ]
    );
}

#[test]
fn test_negative_number_is_not_trim() {
    let nodes = parse("x {{-3}}").unwrap();
    assert_eq!(
        nodes,
        vec![
            Node::Text("x ".into()),
            Node::Action(single(Expr::Number(Number {
                text: "-3".into(),
                value: NumberValue::Int(-3),
            }))),
        ]
    );
}

#[test]
fn test_delimiter_inside_string() {
    let nodes = parse(r#"{{ "a}}b" }}"#).unwrap();
    assert_eq!(nodes, vec![Node::Action(single(Expr::String("a}}b".into())))]);
}

#[test]
fn test_comments() {
    let nodes = parse("a {{/* note */}} b {{- /* trimmed */ -}} c").unwrap();
    assert_eq!(
        nodes,
        vec![
            Node::Text("a ".into()),
            Node::Comment(" note ".into()),
            Node::Text(" b".into()),
            Node::Comment(" trimmed ".into()),
            Node::Text("c".into()),
        ]
    );
}

#[test]
fn test_range_with_two_variables() {
    let nodes = parse("{{range $i, $e := .Ids}}{{if $i}}, {{end}}{{$e}}{{end}}").unwrap();
    let Node::Range(branch) = &nodes[0] else {
        panic!("expected range, got {:?}", nodes[0]);
    };
    assert_eq!(branch.pipeline.decl, vec!["$i".to_string(), "$e".to_string()]);
    assert_eq!(branch.list.len(), 2);
    assert!(branch.else_list.is_empty());

    let Node::If(inner) = &branch.list[0] else {
        panic!("expected if");
    };
    assert_eq!(inner.pipeline, single(var("$i")));
    assert_eq!(inner.list, vec![Node::Text(", ".into())]);
}

#[test]
fn test_if_else() {
    let nodes = parse("{{if .A}}a{{else}}b{{end}}").unwrap();
    assert_eq!(
        nodes,
        vec![Node::If(Branch {
            pipeline: single(field(&["A"])),
            list: vec![Node::Text("a".into())],
            else_list: vec![Node::Text("b".into())],
        })]
    );
}

#[test]
fn test_else_if_chain_nests() {
    let nodes = parse("{{if .A}}a{{else if .B}}b{{else}}c{{end}}").unwrap();
    assert_eq!(
        nodes,
        vec![Node::If(Branch {
            pipeline: single(field(&["A"])),
            list: vec![Node::Text("a".into())],
            else_list: vec![Node::If(Branch {
                pipeline: single(field(&["B"])),
                list: vec![Node::Text("b".into())],
                else_list: vec![Node::Text("c".into())],
            })],
        })]
    );
}

#[test]
fn test_with_else_with() {
    let nodes = parse("{{with .A}}a{{else with .B}}b{{end}}").unwrap();
    let Node::With(outer) = &nodes[0] else {
        panic!("expected with");
    };
    assert!(matches!(outer.else_list[0], Node::With(_)));
}

#[test]
fn test_else_if_inside_with_rejected() {
    let (_, message) = parse_err("{{with .A}}a{{else if .B}}b{{end}}");
    assert_eq!(message, "unexpected {{else if}} in with");
}

#[test]
fn test_range_else() {
    let nodes = parse("{{range .Ids}}{{.}}{{else}}none{{end}}").unwrap();
    let Node::Range(branch) = &nodes[0] else {
        panic!("expected range");
    };
    assert_eq!(branch.list, vec![Node::Action(single(Expr::Dot))]);
    assert_eq!(branch.else_list, vec![Node::Text("none".into())]);
}

#[test]
fn test_variable_scope_ends_with_construct() {
    let (position, message) = parse_err("{{with $x := .A}}{{$x}}{{end}}{{$x}}");
    assert_eq!(message, "undefined variable \"$x\"");
    assert_eq!(position, 32);
}

#[test]
fn test_root_variable_always_defined() {
    let nodes = parse("{{$.Name}}").unwrap();
    assert_eq!(
        nodes,
        vec![Node::Action(single(Expr::Variable {
            name: "$".into(),
            path: vec!["Name".into()],
        }))]
    );
}

#[test]
fn test_chained_pipeline_parses() {
    let nodes = parse("{{ .A | len }}").unwrap();
    let Node::Action(p) = &nodes[0] else {
        panic!("expected action");
    };
    assert_eq!(p.cmds.len(), 2);
}

#[test]
fn test_unknown_function() {
    let (_, message) = parse_err("{{ lower .Name }}");
    assert_eq!(message, "function \"lower\" not defined");
}

#[test]
fn test_non_executable_stage() {
    let (_, message) = parse_err("{{ .A | 3 }}");
    assert_eq!(message, "non executable command in pipeline stage 2");
}

#[test]
fn test_structure_errors() {
    assert_eq!(parse_err("{{if .A}}x").1, "unexpected EOF");
    assert_eq!(parse_err("x{{end}}").1, "unexpected {{end}}");
    assert_eq!(parse_err("{{else}}").1, "unexpected {{else}}");
    assert_eq!(
        parse_err("{{if .A}}a{{else}}b{{else}}c{{end}}").1,
        "expected end; found {{else}}"
    );
    assert_eq!(parse_err("{{break}}").1, "{{break}} outside {{range}}");
    assert_eq!(
        parse_err("{{range $a, $b, $c := .X}}{{end}}").1,
        "unexpected ',' in command"
    );
    assert_eq!(
        parse_err("{{define \"x\"}}{{end}}").1,
        "{{define}} is unsupported"
    );
}

#[test]
fn test_lexical_errors() {
    assert_eq!(parse_err("a {{ .A ").1, "unclosed action");
    assert_eq!(parse_err("a {{/* x }}").1, "unclosed comment");
    assert_eq!(
        parse_err("{{/* x */ .A }}").1,
        "comment ends before closing delimiter"
    );
    assert_eq!(parse_err("{{ \"abc }}").1, "unterminated quoted string");
}

#[test]
fn test_break_inside_range() {
    let nodes = parse("{{range .X}}{{break}}{{continue}}{{end}}").unwrap();
    let Node::Range(branch) = &nodes[0] else {
        panic!("expected range");
    };
    assert_eq!(branch.list, vec![Node::Break, Node::Continue]);
}

#[test]
fn test_template_action() {
    let nodes = parse("{{template \"cols\" .}}").unwrap();
    assert_eq!(
        nodes,
        vec![Node::Template {
            name: "cols".into(),
            pipeline: Some(single(Expr::Dot)),
        }]
    );
}

#[test]
fn test_action_declaration_stays_in_scope() {
    let nodes = parse("{{$x := .A}}{{$x}}").unwrap();
    assert_eq!(nodes.len(), 2);
    let Node::Action(p) = &nodes[0] else {
        panic!("expected action");
    };
    assert_eq!(p.decl, vec!["$x".to_string()]);
}

#[test]
fn test_assignment_requires_declared_variable() {
    assert_eq!(parse_err("{{$y = .A}}").1, "undefined variable \"$y\"");
}
