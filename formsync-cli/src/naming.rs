//! Table and column naming conventions used by schema-driven assembly

/// Convert a plural table name to its singular form using English rules
pub fn singularize(table_name: &str) -> String {
    let lower = table_name.to_lowercase();
    let len = table_name.len();

    // "companies" -> "company"
    if lower.ends_with("ies") && len > 3 {
        return format!("{}y", &table_name[..len - 3]);
    }

    // Words ending in 'ses', 'xes', 'zes', 'ches', 'shes' -> drop 'es'
    if lower.ends_with("sses")
        || lower.ends_with("xes")
        || lower.ends_with("zes")
        || lower.ends_with("ches")
        || lower.ends_with("shes")
    {
        return table_name[..len - 2].to_string();
    }

    // Words ending in 'ss' are already singular
    if lower.ends_with("ss") {
        return table_name.to_string();
    }

    if lower.ends_with('s') && len > 1 {
        return table_name[..len - 1].to_string();
    }

    table_name.to_string()
}

/// Convert a singular table name to its plural form
pub fn pluralize(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let lower = name.to_lowercase();

    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{}es", name);
    }

    // Consonant + 'y' -> 'ies'
    if let Some(stem) = name.strip_suffix(['y', 'Y']) {
        let vowel_before = stem
            .chars()
            .last()
            .is_some_and(|c| "aeiou".contains(c.to_ascii_lowercase()));
        if !stem.is_empty() && !vowel_before {
            return format!("{}ies", stem);
        }
    }

    format!("{}s", name)
}

/// Foreign-key column that points at `table`: `companies` -> `company_id`
pub fn id_column_for_table(table: &str) -> String {
    format!("{}_id", singularize(table))
}

/// Data key a many-to-one relation is nested under in form data.
///
/// `org_id` nests under `org`. Columns without the `_id` suffix fall back to
/// the singular of the target table, so the nested value never shadows the
/// foreign-key column itself.
pub fn data_key_for_column(column: &str, target_table: &str) -> String {
    match column.strip_suffix("_id") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => singularize(target_table),
    }
}
