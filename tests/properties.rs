use nixpam::{EntryState, NixEditor, UpsertOutcome};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn document(category: &str, entries: &BTreeMap<String, bool>, sep: &str) -> String {
    let mut doc = String::from("{ pkgs, ... }:\n{\n  apps = {\n");
    doc.push_str(&format!("    {category}{sep}={sep}{{\n"));
    for (name, enabled) in entries {
        doc.push_str(&format!("      {name}.enable{sep}={sep}{enabled};\n"));
    }
    doc.push_str("    };\n  };\n}\n");
    doc
}

fn is_subsequence<'a>(needle: impl IntoIterator<Item = &'a str>, haystack: &str) -> bool {
    let mut lines = haystack.lines();
    needle
        .into_iter()
        .all(|wanted| lines.any(|line| line == wanted))
}

fn entries() -> impl Strategy<Value = BTreeMap<String, bool>> {
    prop::collection::btree_map("[a-z][a-z0-9-]{0,8}", any::<bool>(), 0..6)
}

proptest! {
    #[test]
    fn upsert_is_idempotent(
        entries in entries(),
        target in "[a-z][a-z0-9-]{0,8}",
        sep in "[ ]{0,2}",
    ) {
        let mut editor = NixEditor::new(document("tools", &entries, &sep));
        editor.upsert("tools", &target).unwrap();
        let once = editor.content().to_string();

        prop_assert_eq!(editor.upsert("tools", &target).unwrap(), UpsertOutcome::Unchanged);
        prop_assert_eq!(editor.content(), once.as_str());
    }

    #[test]
    fn upsert_leaves_target_enabled(
        entries in entries(),
        target in "[a-z][a-z0-9-]{0,8}",
        sep in "[ ]{0,2}",
    ) {
        let mut editor = NixEditor::new(document("tools", &entries, &sep));
        let outcome = editor.upsert("tools", &target).unwrap();

        prop_assert_eq!(editor.entry_state("tools", &target), Some(EntryState::Enabled));
        let expected = match entries.get(&target).copied() {
            None => UpsertOutcome::AddedEntry,
            Some(false) => UpsertOutcome::Enabled,
            Some(true) => UpsertOutcome::Unchanged,
        };
        prop_assert_eq!(outcome, expected);
    }

    #[test]
    fn other_entries_keep_their_state(
        entries in entries(),
        target in "[a-z][a-z0-9-]{0,8}",
    ) {
        let mut editor = NixEditor::new(document("tools", &entries, " "));
        editor.upsert("tools", &target).unwrap();

        for (name, enabled) in entries.iter().filter(|(name, _)| **name != target) {
            let want = if *enabled { EntryState::Enabled } else { EntryState::Disabled };
            prop_assert_eq!(editor.entry_state("tools", name), Some(want));
        }
    }

    #[test]
    fn untouched_lines_survive(
        entries in entries(),
        category in "(tools|editors|shells)",
        target in "[a-z][a-z0-9-]{0,8}",
    ) {
        let original = document("tools", &entries, " ");
        let mut editor = NixEditor::new(original.as_str());
        editor.upsert(&category, &target).unwrap();

        let declaration = format!("{target}.enable = false;");
        let kept = original.lines().filter(|line| line.trim() != declaration);
        prop_assert!(is_subsequence(kept, editor.content()), "{}", editor.content());
    }

    #[test]
    fn new_category_is_created_once(
        entries in entries(),
        target in "[a-z][a-z0-9-]{0,8}",
    ) {
        let mut editor = NixEditor::new(document("tools", &entries, " "));

        prop_assert_eq!(editor.upsert("games", &target).unwrap(), UpsertOutcome::CreatedSection);
        prop_assert!(editor.exists("games"));
        prop_assert_eq!(editor.upsert("games", &target).unwrap(), UpsertOutcome::Unchanged);
        prop_assert_eq!(editor.content().matches("games = {").count(), 1);
    }
}
