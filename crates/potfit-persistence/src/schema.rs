//! Esquema Diesel (escrito a mano, equivalente a `diesel print-schema`).

diesel::table! {
    structures (structure_hash) {
        structure_hash -> Text,
        name -> Text,
        optimized -> Bool,
        payload -> Jsonb,
    }
}

diesel::table! {
    calculations (id) {
        id -> BigInt,
        structure_hash -> Text,
        method -> Text,
        basis -> Text,
        cp -> Bool,
        fragment_indices -> Array<Int4>,
        tag -> Text,
        client -> Text,
        status -> Text,
        energy -> Nullable<Double>,
        log -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(calculations -> structures (structure_hash));

diesel::allow_tables_to_appear_in_same_query!(calculations, structures);
