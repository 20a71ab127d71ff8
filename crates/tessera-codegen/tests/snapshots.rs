#![cfg(feature = "insta")]

use indexmap::IndexMap;
use tessera_codegen::{
    AttrValue, ChildInfo, GeneratorOptions, Lifecycle, Node, NodeKind, PageInfo, ParamType,
    SetterInfo, TagAttribute, TagBinding, TagNode, generate,
};

fn text(text: &str) -> Node {
    Node::new(NodeKind::TemplateText { text: text.into() })
}

#[test]
fn hello_page() {
    let nodes = vec![
        text("<p>Hello, "),
        Node::new(NodeKind::ElExpression {
            expression: "name".into(),
        }),
        text("!</p>"),
    ];
    let source = generate(&nodes, &PageInfo::new("hello"), &GeneratorOptions::default()).unwrap();
    insta::assert_snapshot!("hello_page", source);
}

#[test]
fn pooled_tag_page() {
    let mut setters = IndexMap::new();
    setters.insert(
        "value".to_string(),
        SetterInfo {
            method: "set_value".into(),
            param_type: ParamType::Text,
            editor: None,
        },
    );
    let out = TagNode {
        prefix: "c".into(),
        local_name: "out".into(),
        binding: Some(TagBinding {
            handler: "tags::Out".into(),
            lifecycle: Lifecycle::Classic,
            setters,
            dynamic_attributes: false,
        }),
        attributes: vec![TagAttribute {
            name: "value".into(),
            uri: None,
            value: AttrValue::Literal("x".into()),
            dynamic: false,
        }],
        variables: Vec::new(),
        nesting_level: 0,
        has_empty_body: true,
        child_info: ChildInfo::default(),
    };
    let nodes = vec![Node::new(NodeKind::ExtensionTag(out))];
    let source = generate(&nodes, &PageInfo::new("tagged"), &GeneratorOptions::default()).unwrap();
    insta::assert_snapshot!("pooled_tag_page", source);
}
