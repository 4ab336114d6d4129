//! Integration tests for arch normalization with real view arches.
//!
//! Every patch is serialized, parsed back and applied to the old arch, the way
//! a view inheritance engine would consume it.

use archdiff::{
    apply_patch, apply_patch_str, normalize, parse_arch, ArchError, ArchNormalizer, Patch,
    Position,
};
use archdiff_core::{NormalizeConfig, SyntheticNames};
use tracing_subscriber::EnvFilter;

/// Compiler logs for a failing test: `RUST_LOG=archdiff=trace cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const BASE_FORM: &str = r#"
    <form string="Partner">
        <header>
            <button name="action_confirm" string="Confirm" type="object"/>
            <button name="action_confirm" string="Confirm again" type="object"/>
        </header>
        <sheet>
            <group name="main">
                <field name="name"/>
                <field name="email" widget="email"/>
                <field name="phone"/>
            </group>
            <group name="extra">
                <field name="website"/>
            </group>
            <notebook>
                <page string="Notes">
                    <field name="comment"/>
                </page>
            </notebook>
        </sheet>
    </form>
"#;

/// Compile, serialize, re-parse, apply and compare with the compiler's target.
fn assert_round_trip(old: &str, new: &str) -> Patch {
    init_tracing();
    let normalizer = ArchNormalizer::default();
    let normalized = normalizer.compile(old, new).unwrap();
    let xml = normalized.to_xml().unwrap();
    let patch = Patch::from_arch(&parse_arch(&xml).unwrap()).unwrap();

    let patched = apply_patch(&parse_arch(old).unwrap(), &patch).unwrap();
    assert_eq!(patched, normalized.target, "patch:\n{xml}");
    patch
}

#[test]
fn test_identical_arches_produce_empty_patch() {
    assert_eq!(normalize(BASE_FORM, BASE_FORM).unwrap(), "<data/>");
}

#[test]
fn test_indentation_changes_are_not_edits() {
    let compact = BASE_FORM
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("");
    assert_eq!(normalize(BASE_FORM, &compact).unwrap(), "<data/>");
}

#[test]
fn test_insert_field_after_sibling() {
    let old = r#"<form><group><field name="a"/></group></form>"#;
    let new = r#"<form><group><field name="a"/><field name="b"/></group></form>"#;

    assert_eq!(
        normalize(old, new).unwrap(),
        "<data>\n  <xpath expr=\"//field[@name='a']\" position=\"after\">\n    <field name=\"b\"/>\n  </xpath>\n</data>"
    );
    assert_round_trip(old, new);
}

#[test]
fn test_delete_field() {
    let old = r#"<form><group><field name="a"/><field name="b"/></group></form>"#;
    let new = r#"<form><group><field name="a"/></group></form>"#;

    assert_eq!(
        normalize(old, new).unwrap(),
        "<data>\n  <xpath expr=\"//field[@name='b']\" position=\"replace\"/>\n</data>"
    );
    assert_round_trip(old, new);
}

#[test]
fn test_attribute_only_change() {
    let old = r#"<form><field name="x" required="0"/></form>"#;
    let new = r#"<form><field name="x" required="1"/></form>"#;

    let patch = assert_round_trip(old, new);
    assert_eq!(patch.len(), 1);
    assert_eq!(patch.ops[0].expr, "//field[@name='x']");
    assert_eq!(patch.ops[0].position, Position::Attributes);
    assert_eq!(patch.ops[0].content[0].name(), Some("required"));
    assert_eq!(patch.ops[0].content[0].text.as_deref(), Some("1"));
}

#[test]
fn test_move_field_between_groups() {
    let old = r#"<form>
        <group name="A"><field name="y"/><field name="x"/></group>
        <group name="B"><field name="z"/></group>
    </form>"#;
    let new = r#"<form>
        <group name="A"><field name="y"/></group>
        <group name="B"><field name="x"/><field name="z"/></group>
    </form>"#;

    let xml = normalize(old, new).unwrap();
    assert_eq!(xml.matches("position=\"move\"").count(), 1, "{xml}");
    assert!(xml.contains(r#"<xpath expr="//field[@name='x']" position="move"/>"#));
    assert!(!xml.contains("replace"));
    assert_round_trip(old, new);
}

#[test]
fn test_move_with_attribute_change() {
    let old = r#"<form>
        <group name="A"><field name="x" string="Old"/></group>
        <group name="B"><field name="z"/></group>
    </form>"#;
    let new = r#"<form>
        <group name="A"/>
        <group name="B"><field name="z"/><field name="x" string="New"/></group>
    </form>"#;

    let patch = assert_round_trip(old, new);
    let last = patch.ops.last().unwrap();
    assert_eq!(last.position, Position::Attributes);
    assert_eq!(last.expr, "//field[@name='x']");
}

#[test]
fn test_realistic_customization() {
    let new = r#"
    <form string="Partner">
        <header>
            <button name="action_confirm" string="Confirm" type="object"/>
            <button name="action_confirm" string="Confirm again" type="object" invisible="1"/>
        </header>
        <sheet>
            <group name="main">
                <field name="name" required="1"/>
                <field name="phone"/>
                <field name="mobile"/>
            </group>
            <group name="extra">
                <field name="email" widget="email"/>
                <field name="website"/>
            </group>
            <notebook>
                <page string="Notes">
                    <field name="comment"/>
                </page>
                <page string="Sales">
                    <group>
                        <field name="user_id"/>
                    </group>
                </page>
            </notebook>
        </sheet>
    </form>"#;

    let patch = assert_round_trip(BASE_FORM, new);
    let xml = normalize(BASE_FORM, new).unwrap();

    assert!(xml.contains(r#"<xpath expr="//field[@name='email']" position="move"/>"#));
    assert!(xml.contains("//form[1]/header[1]/button[@name='action_confirm'][2]"));
    assert!(patch
        .ops
        .iter()
        .any(|op| op.position == Position::Attributes && op.expr == "//field[@name='name']"));
    assert!(!patch.ops.iter().any(|op| op.position == Position::Replace));
}

#[test]
fn test_added_repeated_groups_get_stable_names() {
    let old = r#"<form><sheet><group name="main"><field name="a"/></group></sheet></form>"#;
    let new = r#"<form><sheet>
        <group name="main"><field name="a"/></group>
        <group><field name="b"/></group>
        <group><field name="c"/></group>
    </sheet></form>"#;

    let first = normalize(old, new).unwrap();
    let second = normalize(old, new).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.matches("name=\"studio_group_").count(), 2, "{first}");
    assert_round_trip(old, new);

    // Re-normalizing against the patched arch gives the same patch
    let normalizer = ArchNormalizer::default();
    let normalized = normalizer.compile(old, new).unwrap();
    let patched = apply_patch(&parse_arch(old).unwrap(), &normalized.patch).unwrap();
    let again = normalizer
        .compile_trees(&parse_arch(old).unwrap(), &patched)
        .unwrap();
    assert_eq!(again.patch, normalized.patch);
    assert!(normalizer
        .compile_trees(&patched, &normalized.target)
        .unwrap()
        .is_empty());
}

#[test]
fn test_random_synthetic_names() {
    let config = NormalizeConfig {
        synthetic_names: SyntheticNames::Random,
        ..NormalizeConfig::default()
    };
    let old = "<form><sheet/></form>";
    let new = "<form><sheet><group/><group/></sheet></form>";

    let normalized = ArchNormalizer::new(config).compile(old, new).unwrap();
    let groups = &normalized.target.children[0].children;
    assert!(groups
        .iter()
        .all(|g| g.name().is_some_and(|n| n.starts_with("studio_group_"))));
}

#[test]
fn test_root_tag_change_replaces_everything() {
    let old = r#"<form><field name="a"/></form>"#;
    let new = r#"<tree><field name="a"/></tree>"#;

    let patch = assert_round_trip(old, new);
    assert_eq!(patch.len(), 1);
    assert_eq!(patch.ops[0].position, Position::Replace);
    assert_eq!(patch.ops[0].content[0].tag, "tree");
}

#[test]
fn test_text_and_tail_edits() {
    let old = r#"<form><div class="o_note">Read <b>this</b> first</div><field name="a"/></form>"#;
    let new = r#"<form><div class="o_note">Read <b>that</b> first</div><field name="a"/></form>"#;
    assert_round_trip(old, new);
}

#[test]
fn test_target_keeps_spacing_around_inline_elements() {
    let old = r#"<form><div class="o_note">Read <b>this</b> first</div><field name="a"/></form>"#;
    let new = r#"<form><div class="o_note">Read <b>that</b> first</div><field name="a"/></form>"#;

    let normalized = ArchNormalizer::default().compile(old, new).unwrap();
    let target = normalized.target_xml().unwrap();
    assert!(
        target.contains(r#"<div class="o_note">Read <b>that</b> first</div>"#),
        "{target}"
    );
    assert!(normalized.to_xml().unwrap().contains("<b>that</b> first"));
}

/// A form with `count` fields in one group, `required` set on the edited ones.
fn large_form(count: usize, edited: &[usize]) -> String {
    let mut xml = String::from(r#"<form><sheet><group name="main">"#);
    for i in 0..count {
        let required = if edited.contains(&i) { "1" } else { "0" };
        xml.push_str(&format!(
            r#"<field name="f{i}" string="F{i}" required="{required}" widget="char"/>"#
        ));
    }
    xml.push_str("</group></sheet></form>");
    xml
}

#[test]
fn test_large_form_edited_at_both_ends() {
    let old = large_form(3000, &[]);
    let new = large_form(3000, &[0, 2999]);

    let patch = assert_round_trip(&old, &new);
    assert_eq!(patch.len(), 2);
    assert!(patch.ops.iter().all(|op| op.position == Position::Attributes));
    assert_eq!(patch.ops[0].expr, "//field[@name='f0']");
    assert_eq!(patch.ops[1].expr, "//field[@name='f2999']");
}

#[test]
fn test_apply_serialized_patch() {
    let old = r#"<form><group><field name="a"/></group></form>"#;
    let new = r#"<form><group><field name="b"/><field name="a"/></group></form>"#;

    let patch = normalize(old, new).unwrap();
    let patched = apply_patch_str(old, &patch).unwrap();
    assert_eq!(parse_arch(&patched).unwrap(), parse_arch(new).unwrap());
}

#[test]
fn test_parse_errors_surface() {
    let result = normalize("<form><group></form>", "<form/>");
    assert!(matches!(result, Err(ArchError::Parse(_))));

    let result = normalize("<form/>", "");
    assert!(matches!(result, Err(ArchError::Parse(_))));
}

#[test]
fn test_invalid_config_rejected() {
    let config = NormalizeConfig {
        synthetic_name_prefix: "bad prefix".to_string(),
        ..NormalizeConfig::default()
    };
    let result = ArchNormalizer::new(config).compile("<form/>", "<form/>");
    assert!(matches!(result, Err(ArchError::Config(_))));
}
