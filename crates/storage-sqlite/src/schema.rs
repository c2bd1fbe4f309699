// Tables with a fixed shape. Entity tables share one layout and are
// addressed by name at runtime, see `records`.

diesel::table! {
    outbox (id) {
        id -> BigInt,
        entity_type -> Text,
        operation -> Text,
        payload -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    settings (key) {
        key -> Text,
        payload -> Text,
        sync_status -> Nullable<Text>,
        sync_error -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(outbox, settings);
