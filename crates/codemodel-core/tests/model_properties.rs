//! End-to-end behaviour of the code model through its public API.
//!
//! Tests cover:
//! - Freezing: deep propagation, container-scoped freezing
//! - External views: immutable from construction
//! - Copying: independence, cyclic parent back-edges, copy-once
//! - Containers: idempotent add, key collisions, rename re-keying
//! - Inheritance: annotations visible through overriding and supertypes
//! - Merging: override independence, keep is inert, counterparts
//! - Randomized container edit sequences keep list and index consistent

use std::collections::HashSet;

use codemodel_core::{
    CodeModel, CopyMapper, Declaration, DeclarationSource, MergeStrategy, Modifier, ModelError,
    NodeData, NodeId, Parent, Role, TypeKind, TypeRef,
};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// `class Account { int balance; String owner; void deposit(int amount) { ... } }`
fn account(model: &mut CodeModel) -> NodeId {
    let ty = model.new_type("Account", TypeKind::Class).unwrap();
    let fields = model.container_of(ty, Role::Fields).unwrap();
    for (name, ty_name) in [("balance", "int"), ("owner", "String")] {
        let f = model.new_field(name, TypeRef::named(ty_name)).unwrap();
        model.add(fields, f).unwrap();
    }

    let deposit = model.new_method("deposit", Some(TypeRef::named("void"))).unwrap();
    let params = model.container_of(deposit, Role::Parameters).unwrap();
    let amount = model.new_parameter("amount", TypeRef::named("int")).unwrap();
    model.add(params, amount).unwrap();
    let body = model.new_expression("balance += amount;").unwrap();
    model.set_body(deposit, Some(body)).unwrap();
    let methods = model.container_of(ty, Role::Methods).unwrap();
    model.add(methods, deposit).unwrap();
    ty
}

fn names(model: &mut CodeModel, owner: NodeId, role: Role) -> Vec<String> {
    let cid = model.container_of(owner, role).unwrap();
    let items = model.declared(cid).unwrap().to_vec();
    items
        .into_iter()
        .map(|i| model.name(i).unwrap().unwrap_or_default().to_string())
        .collect()
}

fn assert_read_only<T: std::fmt::Debug>(result: Result<T, ModelError>) {
    assert!(
        matches!(result, Err(ModelError::ReadOnly { .. })),
        "expected ReadOnly, got {result:?}"
    );
}

// ---------------------------------------------------------------------------
// Immutability
// ---------------------------------------------------------------------------

#[test]
fn frozen_subtree_rejects_every_mutator() {
    let mut model = CodeModel::new();
    let ty = account(&mut model);
    model.set_immutable(ty).unwrap();

    let fields = model.container_of(ty, Role::Fields).unwrap();
    let methods = model.container_of(ty, Role::Methods).unwrap();
    let balance = model.get_declared(fields, "balance").unwrap().unwrap();
    let deposit = model.get_declared(methods, "deposit(int)").unwrap().unwrap();
    let body = model.node(deposit).unwrap().slot().unwrap();
    let params = model.container_of(deposit, Role::Parameters).unwrap();
    let amount = model.declared(params).unwrap()[0];

    assert_read_only(model.set_name(ty, "Ledger"));
    assert_read_only(model.add_modifier(ty, Modifier::Public));
    assert_read_only(model.set_type_ref(balance, TypeRef::named("long")));
    assert_read_only(model.set_text(body, "return;"));
    assert_read_only(model.set_body(deposit, None));
    assert_read_only(model.set_name(amount, "value"));
    assert_read_only(model.remove(fields, balance));
    let extra = model.new_field("extra", TypeRef::named("int")).unwrap();
    assert_read_only(model.add(fields, extra));
    // Repeated freezing is a no-op.
    model.set_immutable(ty).unwrap();
}

#[test]
fn external_view_is_immutable_from_construction() {
    let mut model = CodeModel::new();
    let ext = model
        .external(Declaration::class("lib", "Fixed").with_child(Declaration::field("x", "int")))
        .unwrap();
    assert!(model.is_immutable(ext).unwrap());
    assert_read_only(model.set_name(ext, "Other"));

    let fields = model.container_of(ext, Role::Fields).unwrap();
    let x = model.get_declared(fields, "x").unwrap().unwrap();
    assert!(model.is_immutable(x).unwrap());
}

#[test]
fn freezing_a_container_freezes_exactly_its_items() {
    let mut model = CodeModel::new();
    let ty = model.new_type("Triple", TypeKind::Class).unwrap();
    let fields = model.container_of(ty, Role::Fields).unwrap();
    let mut items = Vec::new();
    for name in ["a", "b", "c"] {
        let f = model.new_field(name, TypeRef::named("int")).unwrap();
        items.push(model.add(fields, f).unwrap());
    }
    let m = model.new_method("m", None).unwrap();
    let methods = model.container_of(ty, Role::Methods).unwrap();
    let m = model.add(methods, m).unwrap();

    model.freeze_container(fields).unwrap();

    let frozen: Vec<NodeId> = model
        .subtree(ty)
        .unwrap()
        .into_iter()
        .filter(|&n| model.is_immutable(n).unwrap())
        .collect();
    assert_eq!(frozen.len(), 3);
    for item in &items {
        assert!(frozen.contains(item));
    }
    assert!(!model.is_immutable(ty).unwrap());
    assert!(!model.is_immutable(m).unwrap());
    model.set_name(m, "n").unwrap();
}

// ---------------------------------------------------------------------------
// Copying
// ---------------------------------------------------------------------------

#[test]
fn copy_shares_no_owned_descendant() {
    let mut model = CodeModel::new();
    let ty = account(&mut model);
    let copy = model.copy(ty).unwrap();

    let original: HashSet<NodeId> = model.subtree(ty).unwrap().into_iter().collect();
    let copied: HashSet<NodeId> = model.subtree(copy).unwrap().into_iter().collect();
    assert_eq!(original.len(), copied.len());
    assert!(original.is_disjoint(&copied));
    for &n in &copied {
        assert!(!model.is_immutable(n).unwrap());
    }
    model.assert_consistency();
}

#[test]
fn copied_item_points_back_at_copied_container() {
    let mut model = CodeModel::new();
    let ty = account(&mut model);
    let fields = model.container_of(ty, Role::Fields).unwrap();
    let balance = model.get_declared(fields, "balance").unwrap().unwrap();
    // The back-edge: item -> container -> owner.
    assert_eq!(model.parent(balance).unwrap(), Some(Parent::Container(fields)));
    assert_eq!(model.owner(balance).unwrap(), Some(ty));

    let mut mapper = CopyMapper::new();
    let copy = model.copy_with(ty, &mut mapper).unwrap();
    let fields2 = mapper.get_container(fields).unwrap();
    let balance2 = mapper.get(balance).unwrap();

    assert_eq!(model.container_of(copy, Role::Fields).unwrap(), fields2);
    assert_eq!(model.parent(balance2).unwrap(), Some(Parent::Container(fields2)));
    assert_eq!(model.owner(balance2).unwrap(), Some(copy));

    let originals = mapper.originals();
    let unique: HashSet<&NodeId> = originals.iter().collect();
    assert_eq!(unique.len(), originals.len());
    assert_eq!(originals.len(), model.subtree(ty).unwrap().len());
}

#[test]
fn editing_a_copy_leaves_the_original_alone() {
    let mut model = CodeModel::new();
    let ty = account(&mut model);
    let copy = model.copy(ty).unwrap();
    let fields = model.container_of(copy, Role::Fields).unwrap();
    let owner = model.get_declared(fields, "owner").unwrap().unwrap();
    model.remove(fields, owner).unwrap();
    model.set_name(copy, "Savings").unwrap();

    assert_eq!(names(&mut model, ty, Role::Fields), vec!["balance", "owner"]);
    assert_eq!(model.name(ty).unwrap(), Some("Account"));
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

#[test]
fn add_is_idempotent_and_collisions_are_rejected() {
    let mut model = CodeModel::new();
    let ty = account(&mut model);
    let fields = model.container_of(ty, Role::Fields).unwrap();
    let balance = model.get_declared(fields, "balance").unwrap().unwrap();

    assert_eq!(model.add(fields, balance).unwrap(), balance);
    assert_eq!(names(&mut model, ty, Role::Fields), vec!["balance", "owner"]);

    let impostor = model.new_field("balance", TypeRef::named("long")).unwrap();
    assert!(matches!(
        model.add(fields, impostor),
        Err(ModelError::DuplicateKey { .. })
    ));
}

#[test]
fn rename_rekeys_in_place() {
    let mut model = CodeModel::new();
    let ty = account(&mut model);
    let fields = model.container_of(ty, Role::Fields).unwrap();
    let balance = model.get_declared(fields, "balance").unwrap().unwrap();

    model.rename(balance, "funds").unwrap();
    assert_eq!(model.get(fields, "funds").unwrap(), Some(balance));
    assert_eq!(model.get(fields, "balance").unwrap(), None);
    assert_eq!(names(&mut model, ty, Role::Fields), vec!["funds", "owner"]);
}

#[test]
fn rename_onto_existing_key_leaves_both_intact() {
    let mut model = CodeModel::new();
    let ty = account(&mut model);
    let fields = model.container_of(ty, Role::Fields).unwrap();
    let balance = model.get_declared(fields, "balance").unwrap().unwrap();
    let owner = model.get_declared(fields, "owner").unwrap().unwrap();

    assert!(matches!(
        model.rename(balance, "owner"),
        Err(ModelError::DuplicateKey { .. })
    ));
    assert_eq!(model.get(fields, "balance").unwrap(), Some(balance));
    assert_eq!(model.get(fields, "owner").unwrap(), Some(owner));
}

// ---------------------------------------------------------------------------
// Inheritance
// ---------------------------------------------------------------------------

fn method_with_annotations(model: &mut CodeModel, ty: NodeId, name: &str, annotations: &[&str]) -> NodeId {
    let method = model.new_method(name, Some(TypeRef::named("void"))).unwrap();
    let cid = model.container_of(method, Role::Annotations).unwrap();
    for annotation in annotations {
        let a = model.new_annotation(TypeRef::named(*annotation)).unwrap();
        model.add(cid, a).unwrap();
    }
    let methods = model.container_of(ty, Role::Methods).unwrap();
    model.add(methods, method).unwrap();
    method
}

#[test]
fn overriding_method_sees_inherited_annotations() {
    let mut model = CodeModel::new();
    let base = model.new_type("Base", TypeKind::Class).unwrap();
    let base_run = method_with_annotations(&mut model, base, "run", &["Deprecated", "Beta"]);
    let derived = model.new_type("Derived", TypeKind::Class).unwrap();
    model.set_supertypes(derived, vec![TypeRef::resolved("Base", base)]).unwrap();
    let derived_run = method_with_annotations(&mut model, derived, "run", &["Beta"]);

    assert_eq!(model.supers(derived_run).unwrap(), vec![base_run]);

    let base_annotations = model.container_of(base_run, Role::Annotations).unwrap();
    let deprecated = model.get_declared(base_annotations, "Deprecated").unwrap().unwrap();
    let annotations = model.container_of(derived_run, Role::Annotations).unwrap();
    assert_eq!(model.get_declared(annotations, "Deprecated").unwrap(), None);
    assert_eq!(model.get(annotations, "Deprecated").unwrap(), Some(deprecated));

    let local_beta = model.get_declared(annotations, "Beta").unwrap().unwrap();
    let all: Vec<NodeId> = model.all(annotations).collect::<Result<_, _>>().unwrap();
    assert_eq!(all, vec![local_beta, deprecated]);
}

#[test]
fn type_annotations_are_inherited_from_supertypes() {
    let mut model = CodeModel::new();
    let base = model.new_type("Base", TypeKind::Class).unwrap();
    let marker = model.new_annotation(TypeRef::named("Serializable")).unwrap();
    let base_annotations = model.container_of(base, Role::Annotations).unwrap();
    model.add(base_annotations, marker).unwrap();
    let derived = model.new_type("Derived", TypeKind::Class).unwrap();
    model.set_supertypes(derived, vec![TypeRef::resolved("Base", base)]).unwrap();

    let annotations = model.container_of(derived, Role::Annotations).unwrap();
    assert_eq!(model.get(annotations, "Serializable").unwrap(), Some(marker));
    assert!(model.declared(annotations).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

#[test]
fn override_makes_receiver_equal_through_copies() {
    let mut model = CodeModel::new();
    let receiver = model.new_type("Account", TypeKind::Class).unwrap();
    let fields = model.container_of(receiver, Role::Fields).unwrap();
    let stale = model.new_field("stale", TypeRef::named("int")).unwrap();
    model.add(fields, stale).unwrap();

    let incoming = account(&mut model);
    model.add_modifier(incoming, Modifier::Public).unwrap();
    model.merge(receiver, incoming, MergeStrategy::Override).unwrap();

    assert_eq!(
        model.render_to_string(receiver).unwrap(),
        model.render_to_string(incoming).unwrap()
    );
    assert_eq!(model.parent(stale).unwrap(), None);

    let ours: HashSet<NodeId> = model.subtree(receiver).unwrap().into_iter().collect();
    let theirs: HashSet<NodeId> = model.subtree(incoming).unwrap().into_iter().collect();
    assert!(ours.is_disjoint(&theirs));

    // Later edits to incoming do not leak into the receiver.
    let incoming_fields = model.container_of(incoming, Role::Fields).unwrap();
    let balance = model.get_declared(incoming_fields, "balance").unwrap().unwrap();
    model.set_name(balance, "cash").unwrap();
    assert_eq!(names(&mut model, receiver, Role::Fields), vec!["balance", "owner"]);
    model.assert_consistency();
}

#[test]
fn keep_changes_nothing() {
    let mut model = CodeModel::new();
    let receiver = account(&mut model);
    let before = model.render_to_string(receiver).unwrap();

    let incoming = model.new_type("Account", TypeKind::Interface).unwrap();
    model.add_modifier(incoming, Modifier::Abstract).unwrap();
    let nodes = model.node_count();
    model.merge(receiver, incoming, MergeStrategy::Keep).unwrap();

    assert_eq!(model.render_to_string(receiver).unwrap(), before);
    assert_eq!(model.node_count(), nodes);
}

#[test]
fn merge_counterpart_fills_gaps_from_source() {
    struct Compiled;
    impl DeclarationSource for Compiled {
        fn lookup(&self, _: &str) -> Option<Declaration> {
            None
        }
        fn counterpart(&self, name: &str) -> Option<Declaration> {
            (name == "Account").then(|| {
                Declaration::class("", "Account")
                    .with_modifier(Modifier::Public)
                    .with_child(Declaration::field("audit", "boolean"))
                    .with_child(
                        Declaration::method("deposit", "void")
                            .with_child(Declaration::parameter("amount", "int"))
                            .with_child(Declaration::expression("compiled();")),
                    )
            })
        }
    }

    let mut model = CodeModel::with_source(Compiled);
    let ty = account(&mut model);
    assert!(model.merge_counterpart(ty, MergeStrategy::MergeOverrideBody).unwrap());

    assert_eq!(names(&mut model, ty, Role::Fields), vec!["balance", "owner", "audit"]);
    let audit_container = model.container_of(ty, Role::Fields).unwrap();
    let audit = model.get_declared(audit_container, "audit").unwrap().unwrap();
    assert!(!model.is_immutable(audit).unwrap());

    let methods = model.container_of(ty, Role::Methods).unwrap();
    let deposit = model.get_declared(methods, "deposit(int)").unwrap().unwrap();
    let body = model.node(deposit).unwrap().slot().unwrap();
    assert!(matches!(
        model.node(body).unwrap().data(),
        NodeData::Expression(e) if e.text == "compiled();"
    ));

    let lone = model.new_type("Lonely", TypeKind::Class).unwrap();
    assert!(!model.merge_counterpart(lone, MergeStrategy::Merge).unwrap());
}

// ---------------------------------------------------------------------------
// Randomized container edits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Edit {
    Add(u8),
    Remove(u8),
    Rename(u8, u8),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0u8..6).prop_map(Edit::Add),
        (0u8..6).prop_map(Edit::Remove),
        (0u8..6, 0u8..6).prop_map(|(a, b)| Edit::Rename(a, b)),
    ]
}

fn field_name(n: u8) -> String {
    format!("f{n}")
}

proptest! {
    #[test]
    fn container_edits_keep_list_and_index_consistent(edits in prop::collection::vec(edit(), 1..40)) {
        let mut model = CodeModel::new();
        let ty = model.new_type("Bag", TypeKind::Class).unwrap();
        let fields = model.container_of(ty, Role::Fields).unwrap();

        for edit in edits {
            match edit {
                Edit::Add(n) => {
                    let f = model.new_field(&field_name(n), TypeRef::named("int")).unwrap();
                    let present = model.get_declared(fields, &field_name(n)).unwrap().is_some();
                    let result = model.add(fields, f);
                    prop_assert_eq!(result.is_err(), present);
                }
                Edit::Remove(n) => {
                    if let Some(item) = model.get_declared(fields, &field_name(n)).unwrap() {
                        prop_assert!(model.remove(fields, item).unwrap());
                    }
                }
                Edit::Rename(a, b) => {
                    if let Some(item) = model.get_declared(fields, &field_name(a)).unwrap() {
                        let taken = a != b
                            && model.get_declared(fields, &field_name(b)).unwrap().is_some();
                        let result = model.rename(item, &field_name(b));
                        prop_assert_eq!(result.is_err(), taken);
                    }
                }
            }
            model.assert_consistency();
        }

        let items = model.declared(fields).unwrap().to_vec();
        let mut seen = HashSet::new();
        for item in items {
            let name = model.name(item).unwrap().unwrap().to_string();
            prop_assert_eq!(model.get_declared(fields, &name).unwrap(), Some(item));
            prop_assert!(seen.insert(name));
        }
    }
}
