//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ym::Ym;
    use rusqlite::params;

    fn ym(s: &str) -> Ym {
        Ym::parse(s).unwrap()
    }

    fn apartment(db: &Database) -> i64 {
        db.create_apartment(&NewApartment {
            title: "Unit 12".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        let apartments = db.list_apartments().unwrap();
        assert!(apartments.is_empty());
    }

    #[test]
    fn test_core_schema_exists() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        // Verify meter_readings table exists with expected columns
        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('meter_readings') WHERE name IN ('id', 'apartment_id', 'ym', 'meter_type', 'meter_index', 'value', 'source', 'ocr_value', 'created_at', 'updated_at')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(
            result, 10,
            "meter_readings table should have 10 expected columns"
        );

        // Verify month_states table exists
        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('month_states') WHERE name IN ('apartment_id', 'ym', 'electric_extra_pending', 'electric_expected_snapshot', 'electric_extra_resolved_at', 'bill_pending', 'bill_last_json', 'bill_approved_at', 'bill_sent_at', 'bill_sent_total')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(
            result, 10,
            "month_states table should have 10 expected columns"
        );

        // Verify ingest_events table exists
        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('ingest_events') WHERE name IN ('id', 'apartment_id', 'ym', 'chat_id', 'file_sha256', 'stage', 'reading_written', 'diag_json', 'created_at')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(
            result, 9,
            "ingest_events table should have 9 expected columns"
        );
    }

    #[test]
    fn test_reading_key_is_unique() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let conn = db.conn().unwrap();

        conn.execute(
            "INSERT INTO meter_readings (apartment_id, ym, meter_type, meter_index, value) VALUES (?, '2026-01', 'cold', 1, 100.0)",
            params![id],
        )
        .unwrap();

        // Same (apartment, ym, type, index) key must be rejected
        let result = conn.execute(
            "INSERT INTO meter_readings (apartment_id, ym, meter_type, meter_index, value) VALUES (?, '2026-01', 'cold', 1, 200.0)",
            params![id],
        );
        assert!(result.is_err(), "Duplicate reading key should fail");

        // Different slot under the same type is fine
        conn.execute(
            "INSERT INTO meter_readings (apartment_id, ym, meter_type, meter_index, value) VALUES (?, '2026-01', 'cold', 2, 200.0)",
            params![id],
        )
        .unwrap();
    }

    #[test]
    fn test_apartment_crud() {
        let db = Database::in_memory().unwrap();

        let id = db
            .create_apartment(&NewApartment {
                title: "Квартира 12".to_string(),
                tenant_name: Some("Иван".to_string()),
                ls_account: Some("4001-223".to_string()),
                chat_id: Some(555),
                ..Default::default()
            })
            .unwrap();
        assert!(id > 0);

        let apt = db.get_apartment(id).unwrap().unwrap();
        assert_eq!(apt.title, "Квартира 12");
        assert_eq!(apt.tenant_name.as_deref(), Some("Иван"));
        assert_eq!(apt.ls_account.as_deref(), Some("4001-223"));
        assert_eq!(apt.chat_id, Some(555));
        assert_eq!(apt.electric_expected, 3);

        let apartments = db.list_apartments().unwrap();
        assert_eq!(apartments.len(), 1);

        db.update_apartment(
            id,
            &NewApartment {
                title: "Квартира 12".to_string(),
                tenant_name: Some("Пётр".to_string()),
                note: Some("new tenant".to_string()),
                chat_id: Some(777),
                electric_expected: Some(2),
                ..Default::default()
            },
        )
        .unwrap();

        let apt = db.get_apartment(id).unwrap().unwrap();
        assert_eq!(apt.tenant_name.as_deref(), Some("Пётр"));
        assert_eq!(apt.note.as_deref(), Some("new tenant"));
        assert_eq!(apt.electric_expected, 2);

        // Chat lookup follows the update
        assert!(db.find_apartment_by_chat(555).unwrap().is_none());
        let by_chat = db.find_apartment_by_chat(777).unwrap().unwrap();
        assert_eq!(by_chat.id, id);

        // Missing apartments error explicitly
        let err = db.require_apartment(9999).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = db
            .update_apartment(9999, &NewApartment::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_electric_expected_clamped() {
        let db = Database::in_memory().unwrap();

        let id = db
            .create_apartment(&NewApartment {
                title: "Unit".to_string(),
                electric_expected: Some(7),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(db.electric_expected(id).unwrap(), 3);

        db.set_electric_expected(id, 0).unwrap();
        assert_eq!(db.electric_expected(id).unwrap(), 1);

        db.set_electric_expected(id, 2).unwrap();
        assert_eq!(db.electric_expected(id).unwrap(), 2);

        let err = db.set_electric_expected(9999, 2).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // Missing apartments resolve to the column default
        assert_eq!(db.electric_expected(9999).unwrap(), 3);
    }

    #[test]
    fn test_reading_insert_then_update() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let m = ym("2026-01");

        let w = ReadingWrite::new(id, m.clone(), MeterType::Cold, 1, 100.0, ReadingSource::Ocr);
        let result = db.upsert_reading(&w).unwrap();
        let row_id = match result {
            ReadingUpsertResult::Inserted(row_id) => row_id,
            other => panic!("Expected Inserted, got {:?}", other),
        };

        // Second OCR write on the same key overwrites in place
        let w = ReadingWrite::new(id, m.clone(), MeterType::Cold, 1, 105.0, ReadingSource::Ocr);
        let result = db.upsert_reading(&w).unwrap();
        assert_eq!(result, ReadingUpsertResult::Updated(row_id));

        let reading = db.get_reading(id, &m, MeterType::Cold, 1).unwrap().unwrap();
        assert_eq!(reading.value, 105.0);
        assert_eq!(reading.source, ReadingSource::Ocr);
        assert_eq!(reading.ocr_value, Some(105.0));
    }

    #[test]
    fn test_manual_write_keeps_ocr_audit_value() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let m = ym("2026-01");

        let w = ReadingWrite::new(id, m.clone(), MeterType::Hot, 1, 100.0, ReadingSource::Ocr);
        db.upsert_reading(&w).unwrap();

        // Manual correction on top of an OCR row: the original OCR value
        // stays on the row for audit
        let w = ReadingWrite::new(id, m.clone(), MeterType::Hot, 1, 120.0, ReadingSource::Manual);
        let result = db.upsert_reading(&w).unwrap();
        assert!(matches!(result, ReadingUpsertResult::Updated(_)));

        let reading = db.get_reading(id, &m, MeterType::Hot, 1).unwrap().unwrap();
        assert_eq!(reading.value, 120.0);
        assert_eq!(reading.source, ReadingSource::Manual);
        assert_eq!(reading.ocr_value, Some(100.0));
    }

    #[test]
    fn test_ocr_reconfirmation_keeps_manual_row() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let m = ym("2026-01");

        let w = ReadingWrite::new(id, m.clone(), MeterType::Cold, 1, 250.0, ReadingSource::Manual);
        db.upsert_reading(&w).unwrap();

        // OCR re-reads the same value: row stays manual, OCR value recorded
        let w = ReadingWrite::new(id, m.clone(), MeterType::Cold, 1, 250.0, ReadingSource::Ocr);
        let result = db.upsert_reading(&w).unwrap();
        assert!(matches!(result, ReadingUpsertResult::KeptManual(_)));

        let reading = db.get_reading(id, &m, MeterType::Cold, 1).unwrap().unwrap();
        assert_eq!(reading.source, ReadingSource::Manual);
        assert_eq!(reading.value, 250.0);
        assert_eq!(reading.ocr_value, Some(250.0));

        // A genuinely different OCR value does overwrite
        let w = ReadingWrite::new(id, m.clone(), MeterType::Cold, 1, 260.0, ReadingSource::Ocr);
        let result = db.upsert_reading(&w).unwrap();
        assert!(matches!(result, ReadingUpsertResult::Updated(_)));

        let reading = db.get_reading(id, &m, MeterType::Cold, 1).unwrap().unwrap();
        assert_eq!(reading.source, ReadingSource::Ocr);
        assert_eq!(reading.value, 260.0);
    }

    #[test]
    fn test_list_readings_for_month() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let m = ym("2026-02");

        for (meter_type, index, value) in [
            (MeterType::Hot, 1, 80.0),
            (MeterType::Electric, 2, 40.0),
            (MeterType::Electric, 1, 900.0),
            (MeterType::Cold, 1, 120.0),
        ] {
            let w = ReadingWrite::new(id, m.clone(), meter_type, index, value, ReadingSource::Ocr);
            db.upsert_reading(&w).unwrap();
        }

        // Another month stays invisible
        let w = ReadingWrite::new(
            id,
            ym("2026-03"),
            MeterType::Cold,
            1,
            125.0,
            ReadingSource::Ocr,
        );
        db.upsert_reading(&w).unwrap();

        let readings = db.list_readings_for_month(id, &m).unwrap();
        let keys: Vec<(MeterType, i64)> = readings
            .iter()
            .map(|r| (r.meter_type, r.meter_index))
            .collect();
        assert_eq!(
            keys,
            vec![
                (MeterType::Cold, 1),
                (MeterType::Electric, 1),
                (MeterType::Electric, 2),
                (MeterType::Hot, 1),
            ]
        );

        assert_eq!(
            db.reading_value(id, &m, MeterType::Cold, 1).unwrap(),
            Some(120.0)
        );
        assert_eq!(db.reading_value(id, &m, MeterType::Sewer, 1).unwrap(), None);
    }

    #[test]
    fn test_delete_electric_above() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let m = ym("2026-02");

        for (index, value) in [(1, 300.0), (2, 150.0), (3, 100.0)] {
            let w = ReadingWrite::new(
                id,
                m.clone(),
                MeterType::Electric,
                index,
                value,
                ReadingSource::Ocr,
            );
            db.upsert_reading(&w).unwrap();
        }

        let deleted = db.delete_electric_above(id, &m, 2).unwrap();
        assert_eq!(deleted, 1);

        let slots: Vec<i64> = db
            .electric_readings(id, &m)
            .unwrap()
            .iter()
            .map(|r| r.meter_index)
            .collect();
        assert_eq!(slots, vec![1, 2]);

        // Water rows are untouched
        let w = ReadingWrite::new(id, m.clone(), MeterType::Cold, 1, 50.0, ReadingSource::Ocr);
        db.upsert_reading(&w).unwrap();
        let deleted = db.delete_electric_above(id, &m, 1).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(
            db.reading_value(id, &m, MeterType::Cold, 1).unwrap(),
            Some(50.0)
        );
    }

    #[test]
    fn test_find_near_value_cross_type() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let m = ym("2026-02");

        let w = ReadingWrite::new(id, m.clone(), MeterType::Cold, 1, 100.0, ReadingSource::Ocr);
        db.upsert_reading(&w).unwrap();

        // A hot-water submission carrying (almost) the cold value is found
        let hit = db
            .find_near_value(id, &m, 100.0004, 0.0005, (MeterType::Hot, 1))
            .unwrap()
            .unwrap();
        assert_eq!(hit.meter_type, MeterType::Cold);
        assert_eq!(hit.meter_index, 1);

        // Outside tolerance there is no match
        assert!(db
            .find_near_value(id, &m, 100.002, 0.0005, (MeterType::Hot, 1))
            .unwrap()
            .is_none());

        // The row being written is excluded from its own check
        assert!(db
            .find_near_value(id, &m, 100.0, 0.0005, (MeterType::Cold, 1))
            .unwrap()
            .is_none());

        // With several matches the lowest (type, slot) key wins
        let w = ReadingWrite::new(id, m.clone(), MeterType::Hot, 1, 100.0, ReadingSource::Ocr);
        db.upsert_reading(&w).unwrap();
        let hit = db
            .find_near_value(id, &m, 100.0, 0.0005, (MeterType::Electric, 1))
            .unwrap()
            .unwrap();
        assert_eq!(hit.meter_type, MeterType::Cold);
    }

    #[test]
    fn test_tariff_resolution_order() {
        let db = Database::in_memory().unwrap();

        db.upsert_tariff(&Tariff {
            month_from: ym("2026-01"),
            cold: 50.0,
            hot: 200.0,
            electric: 6.0,
            sewer: 40.0,
            electric_t1: None,
            electric_t2: None,
            electric_t3: None,
        })
        .unwrap();
        db.upsert_tariff(&Tariff {
            month_from: ym("2026-04"),
            cold: 55.0,
            hot: 210.0,
            electric: 6.5,
            sewer: 42.0,
            electric_t1: Some(5.5),
            electric_t2: Some(6.5),
            electric_t3: None,
        })
        .unwrap();

        // Exact lookup
        let exact = db.get_tariff(&ym("2026-04")).unwrap().unwrap();
        assert_eq!(exact.cold, 55.0);
        assert!(db.get_tariff(&ym("2026-03")).unwrap().is_none());

        // A month between rows resolves to the latest row at or before it
        let t = db.tariff_for_month(&ym("2026-03")).unwrap().unwrap();
        assert_eq!(t.month_from, ym("2026-01"));
        let t = db.tariff_for_month(&ym("2026-04")).unwrap().unwrap();
        assert_eq!(t.month_from, ym("2026-04"));
        let t = db.tariff_for_month(&ym("2026-09")).unwrap().unwrap();
        assert_eq!(t.month_from, ym("2026-04"));

        // Before the first row nothing applies
        assert!(db.tariff_for_month(&ym("2025-12")).unwrap().is_none());

        let tariffs = db.list_tariffs().unwrap();
        assert_eq!(tariffs.len(), 2);
        assert_eq!(tariffs[0].month_from, ym("2026-01"));

        // Re-upsert for the same month overwrites the row
        db.upsert_tariff(&Tariff {
            month_from: ym("2026-04"),
            cold: 60.0,
            hot: 210.0,
            electric: 6.5,
            sewer: 42.0,
            electric_t1: None,
            electric_t2: None,
            electric_t3: None,
        })
        .unwrap();
        let t = db.get_tariff(&ym("2026-04")).unwrap().unwrap();
        assert_eq!(t.cold, 60.0);
        assert_eq!(t.electric_t1, None);
        assert_eq!(db.list_tariffs().unwrap().len(), 2);
    }

    #[test]
    fn test_extra_pending_snapshot_survives_reraise() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let m = ym("2026-02");

        assert_eq!(db.extra_pending(id, &m).unwrap(), (false, None));

        db.set_extra_pending(id, &m, 2).unwrap();
        assert_eq!(db.extra_pending(id, &m).unwrap(), (true, Some(2)));

        // Re-raising keeps the first snapshot
        db.set_extra_pending(id, &m, 3).unwrap();
        assert_eq!(db.extra_pending(id, &m).unwrap(), (true, Some(2)));

        db.clear_extra_pending(id, &m).unwrap();
        assert_eq!(db.extra_pending(id, &m).unwrap(), (false, None));

        let state = db.get_month_state(id, &m).unwrap().unwrap();
        assert!(!state.electric_extra_pending);
        assert!(state.electric_expected_snapshot.is_none());
        assert!(state.electric_extra_resolved_at.is_some());
    }

    #[test]
    fn test_bill_snapshot_and_stamps() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let m = ym("2026-02");

        db.save_bill_snapshot(
            id,
            &m,
            r#"{"total_rub":170.0}"#,
            r#"{"cold":{"diff":600.0}}"#,
        )
        .unwrap();
        let state = db.get_month_state(id, &m).unwrap().unwrap();
        assert_eq!(
            state.bill_last_json.as_deref(),
            Some(r#"{"total_rub":170.0}"#)
        );
        assert_eq!(
            state.bill_pending.as_deref(),
            Some(r#"{"cold":{"diff":600.0}}"#)
        );
        assert!(state.bill_approved_at.is_none());

        // Approval clears the blocking items and stamps the time
        db.approve_bill(id, &m).unwrap();
        let state = db.get_month_state(id, &m).unwrap().unwrap();
        assert_eq!(state.bill_pending.as_deref(), Some("{}"));
        assert!(state.bill_approved_at.is_some());

        // Components changed since approval: drop the stamp
        db.reset_bill_approval(id, &m).unwrap();
        let state = db.get_month_state(id, &m).unwrap().unwrap();
        assert!(state.bill_approved_at.is_none());

        db.mark_bill_sent(id, &m, 1234.56).unwrap();
        let state = db.get_month_state(id, &m).unwrap().unwrap();
        assert!(state.bill_sent_at.is_some());
        assert_eq!(state.bill_sent_total, Some(1234.56));
    }

    #[test]
    fn test_ingest_event_lifecycle() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let m = ym("2026-02");

        let event_id = db
            .insert_ingest_event(&NewIngestEvent {
                apartment_id: id,
                ym: m.clone(),
                chat_id: Some(555),
                file_sha256: Some("abc123".to_string()),
            })
            .unwrap();
        assert!(event_id > 0);

        let events = db.list_ingest_events(id, &m).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stage, IngestStage::Received);
        assert!(!events[0].reading_written);
        assert!(events[0].diag_json.is_none());

        db.finish_ingest_event(
            event_id,
            IngestStage::ReadingWritten,
            true,
            Some(r#"{"warnings":[]}"#),
        )
        .unwrap();

        // Second submission, listed newest first
        db.insert_ingest_event(&NewIngestEvent {
            apartment_id: id,
            ym: m.clone(),
            chat_id: Some(555),
            file_sha256: None,
        })
        .unwrap();

        let events = db.list_ingest_events(id, &m).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].id, event_id);
        assert_eq!(events[1].stage, IngestStage::ReadingWritten);
        assert!(events[1].reading_written);
        assert_eq!(events[1].diag_json.as_deref(), Some(r#"{"warnings":[]}"#));
        assert_eq!(events[1].file_sha256.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_ingest_hash_seen_is_per_apartment() {
        let db = Database::in_memory().unwrap();
        let id = apartment(&db);
        let other = db
            .create_apartment(&NewApartment {
                title: "Unit 13".to_string(),
                ..Default::default()
            })
            .unwrap();
        let m = ym("2026-02");

        assert!(!db.ingest_hash_seen(id, "abc123").unwrap());

        db.insert_ingest_event(&NewIngestEvent {
            apartment_id: id,
            ym: m.clone(),
            chat_id: None,
            file_sha256: Some("abc123".to_string()),
        })
        .unwrap();

        assert!(db.ingest_hash_seen(id, "abc123").unwrap());
        assert!(!db.ingest_hash_seen(id, "def456").unwrap());
        assert!(!db.ingest_hash_seen(other, "abc123").unwrap());
    }

    #[test]
    fn test_encrypted_database() {
        use std::fs;

        let test_path = "/tmp/meterbill_test_encrypted.db";

        // Clean up any existing test file
        let _ = fs::remove_file(test_path);

        // Create an encrypted database
        {
            let db = Database::new_with_key(test_path, Some("test-passphrase")).unwrap();

            // Insert some data
            db.create_apartment(&NewApartment {
                title: "Unit 12".to_string(),
                ..Default::default()
            })
            .unwrap();

            let apartments = db.list_apartments().unwrap();
            assert_eq!(apartments.len(), 1);
        }

        // Verify we can open it with the same key
        {
            let db = Database::new_with_key(test_path, Some("test-passphrase")).unwrap();
            let apartments = db.list_apartments().unwrap();
            assert_eq!(apartments.len(), 1);
        }

        // Verify opening without key fails (file is actually encrypted)
        {
            let result = Database::new_with_key(test_path, None);
            assert!(
                result.is_err(),
                "Should fail to open encrypted db without key"
            );
        }

        // Verify opening with wrong key fails
        {
            let result = Database::new_with_key(test_path, Some("wrong-passphrase"));
            assert!(
                result.is_err(),
                "Should fail to open encrypted db with wrong key"
            );
        }

        // Clean up
        let _ = fs::remove_file(test_path);
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let key1 = derive_key("my-secret").unwrap();
        let key2 = derive_key("my-secret").unwrap();
        assert_eq!(key1, key2);

        // Different passphrase = different key
        let key3 = derive_key("other-secret").unwrap();
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_encryption_required_by_default() {
        use std::env;
        use std::fs;

        let test_path = "/tmp/meterbill_test_encryption_required.db";

        // Clean up any existing test file
        let _ = fs::remove_file(test_path);

        // Ensure METERBILL_DB_KEY is not set for this test
        env::remove_var(DB_KEY_ENV);

        // Database::new() should fail without METERBILL_DB_KEY
        let result = Database::new(test_path);
        assert!(
            result.is_err(),
            "Database::new() should fail without METERBILL_DB_KEY"
        );

        let err_msg = match result {
            Err(e) => e.to_string(),
            Ok(_) => panic!("Expected error"),
        };
        assert!(
            err_msg.contains("encryption required") || err_msg.contains(DB_KEY_ENV),
            "Error should mention encryption requirement: {}",
            err_msg
        );

        // new_unencrypted() should succeed
        let result = Database::new_unencrypted(test_path);
        assert!(result.is_ok(), "new_unencrypted() should succeed");

        // Clean up
        let _ = fs::remove_file(test_path);
    }

    #[test]
    fn test_encrypted_vs_unencrypted_incompatible() {
        use std::fs;

        let test_path = "/tmp/meterbill_test_encrypted_vs_unencrypted.db";

        // Clean up any existing test file
        let _ = fs::remove_file(test_path);

        // Create an encrypted database with explicit key
        {
            let db = Database::new_with_key(test_path, Some("test-secret-key")).unwrap();
            db.create_apartment(&NewApartment {
                title: "Unit 12".to_string(),
                ..Default::default()
            })
            .unwrap();
        }

        // Try to open with unencrypted - should fail because DB is encrypted
        let result = Database::new_unencrypted(test_path);
        assert!(
            result.is_err(),
            "Should fail to open encrypted db without key"
        );

        // Clean up
        let _ = fs::remove_file(test_path);
    }

    #[test]
    fn test_unencrypted_database_roundtrip() {
        use std::fs;

        let test_path = "/tmp/meterbill_test_unencrypted.db";

        // Clean up any existing test file
        let _ = fs::remove_file(test_path);

        // Create unencrypted database
        {
            let db = Database::new_unencrypted(test_path).unwrap();
            db.create_apartment(&NewApartment {
                title: "Unit 12".to_string(),
                ..Default::default()
            })
            .unwrap();

            let apartments = db.list_apartments().unwrap();
            assert_eq!(apartments.len(), 1);
        }

        // Reopen unencrypted database
        {
            let db = Database::new_unencrypted(test_path).unwrap();
            let apartments = db.list_apartments().unwrap();
            assert_eq!(apartments.len(), 1);
        }

        // Clean up
        let _ = fs::remove_file(test_path);
    }
}
