//! Esquema Diesel (escrito a mano). Reemplazable con `diesel print-schema`.

diesel::table! {
    flow_checkpoints (flow_id) {
        flow_id -> Uuid,
        owning_identity -> Text,
        flow_type -> Text,
        waiting_for -> Nullable<Text>,
        suspend_count -> BigInt,
        state -> Jsonb,
        updated_at -> Timestamptz,
    }
}
