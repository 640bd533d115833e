use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::env;
use uuid::Uuid;

use utility_billing_api::auth::{AuthContext, Role};
use utility_billing_api::db::Database;
use utility_billing_api::db_storage::BillingStorage;
use utility_billing_api::core::errors::AppError;
use utility_billing_api::import;
use utility_billing_api::maintenance::{self, BackfillOutcome, BackfillRequest};
use utility_billing_api::models::{BillingInterval, NewReading, PeriodDraft};
use utility_billing_api::core::readiness;
use utility_billing_api::periods::PeriodNaming;

// Store-backed tests. Marked ignored to avoid running against a real database
// by accident; set TEST_DATABASE_URL to a disposable database to run them.

async fn storage() -> anyhow::Result<BillingStorage> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;
    let db = Database::with_max_connections(&db_url, 2).await?;
    Ok(BillingStorage::new(db.pool.clone()))
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn draft(name: &str) -> PeriodDraft {
    PeriodDraft {
        period_name: name.to_string(),
        period_type: BillingInterval::Quarterly,
        start_date: date(2025, 7, 1),
        end_date: date(2025, 9, 30),
        reading_deadline: date(2025, 10, 14),
    }
}

async fn insert_household(storage: &BillingStorage, number: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO households (household_number, owner_name) VALUES ($1, 'Test Owner') RETURNING id",
    )
    .bind(number)
    .fetch_one(storage.pool())
    .await?;
    Ok(id)
}

async fn insert_service(storage: &BillingStorage, name: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO utility_services (name, unit) VALUES ($1, 'm3') RETURNING id",
    )
    .bind(name)
    .fetch_one(storage.pool())
    .await?;
    Ok(id)
}

fn admin() -> AuthContext {
    AuthContext {
        user_id: Uuid::new_v4(),
        role: Role::Admin,
    }
}

async fn insert_main_meter(
    storage: &BillingStorage,
    service_id: Uuid,
    meter_number: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO main_meters (service_id, meter_number) VALUES ($1, $2) RETURNING id",
    )
    .bind(service_id)
    .bind(meter_number)
    .fetch_one(storage.pool())
    .await?;
    Ok(id)
}

fn reading(meter_id: Uuid, period_id: Uuid) -> NewReading {
    NewReading {
        household_meter_id: meter_id,
        billing_period_id: period_id,
        meter_reading: BigDecimal::from(120),
        raw_consumption: Some(BigDecimal::from(12)),
        reading_date: date(2025, 8, 5),
        notes: None,
    }
}

#[tokio::test]
#[ignore]
async fn find_or_create_period_is_idempotent() -> anyhow::Result<()> {
    let storage = storage().await?;
    let name = unique("Q-test");

    let (first, created) = storage.find_or_create_period(&draft(&name)).await?;
    let (second, created_again) = storage.find_or_create_period(&draft(&name)).await?;

    assert!(created);
    assert!(!created_again);
    assert_eq!(first.id, second.id);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn second_reading_for_pair_conflicts() -> anyhow::Result<()> {
    let storage = storage().await?;
    let household = insert_household(&storage, &unique("H")).await?;
    let service = insert_service(&storage, &unique("Water")).await?;
    let (meter, _) = storage.find_or_create_meter(household, service).await?;
    let (period, _) = storage.find_or_create_period(&draft(&unique("Q-dup"))).await?;

    storage.record_reading(&reading(meter.id, period.id)).await?;
    let err = storage
        .record_reading(&reading(meter.id, period.id))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn readiness_lists_missing_service() -> anyhow::Result<()> {
    let storage = storage().await?;
    let household = insert_household(&storage, &unique("H")).await?;
    let water = unique("Water");
    let heat = unique("Heat");
    let water_id = insert_service(&storage, &water).await?;
    let heat_id = insert_service(&storage, &heat).await?;
    let (water_meter, _) = storage.find_or_create_meter(household, water_id).await?;
    storage.find_or_create_meter(household, heat_id).await?;
    let (period, _) = storage.find_or_create_period(&draft(&unique("Q-ready"))).await?;

    storage.record_reading(&reading(water_meter.id, period.id)).await?;

    let admin = AuthContext {
        user_id: Uuid::new_v4(),
        role: Role::Admin,
    };
    let report = readiness::check_readiness(&admin, &storage, period.id).await?;

    let entry = report
        .households
        .iter()
        .find(|h| h.household_id == household)
        .expect("household should be listed as not ready");
    assert!(!entry.is_ready);
    assert_eq!(entry.missing_services, vec![heat]);
    assert!(!report.is_complete);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn readiness_unknown_period_is_not_found() -> anyhow::Result<()> {
    let storage = storage().await?;
    let admin = AuthContext {
        user_id: Uuid::new_v4(),
        role: Role::Admin,
    };

    let err = readiness::check_readiness(&admin, &storage, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn deleting_period_removes_its_readings_first() -> anyhow::Result<()> {
    let storage = storage().await?;
    let service = insert_service(&storage, &unique("Water")).await?;
    let (period, _) = storage.find_or_create_period(&draft(&unique("Q-del"))).await?;

    for _ in 0..5 {
        let household = insert_household(&storage, &unique("H")).await?;
        let (meter, _) = storage.find_or_create_meter(household, service).await?;
        storage.record_reading(&reading(meter.id, period.id)).await?;
    }
    assert_eq!(storage.count_readings_for_period(period.id).await?, 5);

    let deletion = maintenance::delete_billing_period(storage.pool(), period.id).await?;

    assert_eq!(deletion.readings_deleted, 5);
    assert_eq!(deletion.periods_deleted, 1);
    assert_eq!(storage.count_readings_for_period(period.id).await?, 0);
    assert!(storage.find_period(period.id).await?.is_none());

    let again = maintenance::delete_billing_period(storage.pool(), period.id)
        .await
        .unwrap_err();
    assert!(matches!(again, AppError::NotFound(_)));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn backfill_skips_existing_reading() -> anyhow::Result<()> {
    let storage = storage().await?;
    let household = insert_household(&storage, &unique("H")).await?;
    let service = insert_service(&storage, &unique("Water")).await?;
    let (meter, _) = storage.find_or_create_meter(household, service).await?;
    let (period, _) = storage.find_or_create_period(&draft(&unique("Q-bf"))).await?;

    let request = BackfillRequest {
        meter_id: meter.id,
        period_id: period.id,
        meter_reading: BigDecimal::from(0),
        raw_consumption: Some(BigDecimal::from(30)),
        reading_date: date(2025, 9, 30),
        note: "meter replaced, new meter starts at zero, consumption estimated".to_string(),
    };

    let first = maintenance::backfill_reading(&storage, request.clone()).await?;
    let BackfillOutcome::Inserted(id) = first else {
        panic!("expected an insert, got {:?}", first);
    };
    let second = maintenance::backfill_reading(&storage, request).await?;
    assert_eq!(second, BackfillOutcome::AlreadyPresent(id));

    let stored = storage.find_reading(meter.id, period.id).await?.unwrap();
    assert!(stored.notes.unwrap().contains("meter replaced"));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn seeding_templates_twice_inserts_nothing_new() -> anyhow::Result<()> {
    let storage = storage().await?;

    maintenance::seed_notification_templates(storage.pool()).await?;
    let second = maintenance::seed_notification_templates(storage.pool()).await?;

    assert_eq!(second, 0);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn readiness_orders_households_numerically() -> anyhow::Result<()> {
    let storage = storage().await?;
    let service = insert_service(&storage, &unique("Water")).await?;
    let (period, _) = storage.find_or_create_period(&draft(&unique("Q-order"))).await?;

    // Same-length prefix keeps the numbers comparable with other households in the table.
    let base = format!("{:09}", Uuid::new_v4().as_u128() % 1_000_000_000);
    let mut ids = Vec::new();
    for suffix in ["2", "10", "1"] {
        let household = insert_household(&storage, &format!("{}{}", base, suffix)).await?;
        storage.find_or_create_meter(household, service).await?;
        ids.push(household);
    }

    let report = readiness::check_readiness(&admin(), &storage, period.id).await?;
    let order: Vec<String> = report
        .households
        .iter()
        .filter(|h| ids.contains(&h.household_id))
        .map(|h| h.household_number.clone())
        .collect();

    assert_eq!(
        order,
        vec![
            format!("{}1", base),
            format!("{}2", base),
            format!("{}10", base)
        ]
    );
    Ok(())
}

#[tokio::test]
#[ignore]
async fn import_reuses_period_with_same_quarter_name() -> anyhow::Result<()> {
    let storage = storage().await?;
    let first_household = unique("H");
    let second_household = unique("H");
    let service = unique("Water");
    insert_household(&storage, &first_household).await?;
    insert_household(&storage, &second_household).await?;
    insert_service(&storage, &service).await?;

    if let Some(existing) = storage.find_period_by_name("2019-Q3").await? {
        maintenance::delete_billing_period(storage.pool(), existing.id).await?;
    }

    let csv = format!(
        "household_number,service,reading_date,meter_reading,raw_consumption\n\
         {},{},2019-08-31,\"120,5\",\n\
         {},{},15.09.2019,98,7\n",
        first_household, service, second_household, service
    );

    let summary = import::import_readings(
        &storage,
        import::read_rows(csv.as_bytes()),
        PeriodNaming::Quarter,
        14,
    )
    .await?;

    assert_eq!(summary.imported, 2);
    assert_eq!(summary.periods_created, 1);
    assert_eq!(summary.meters_created, 2);
    assert_eq!(summary.parse_errors, 0);

    let period = storage.find_period_by_name("2019-Q3").await?.unwrap();
    assert_eq!(period.start_date, date(2019, 7, 1));
    assert_eq!(period.end_date, date(2019, 9, 30));
    assert_eq!(storage.count_readings_for_period(period.id).await?, 2);

    let again = import::import_readings(
        &storage,
        import::read_rows(csv.as_bytes()),
        PeriodNaming::Quarter,
        14,
    )
    .await?;
    assert_eq!(again.imported, 0);
    assert_eq!(again.duplicates, 2);
    assert_eq!(again.periods_created, 0);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn cleanup_removes_only_periods_before_cutoff() -> anyhow::Result<()> {
    let storage = storage().await?;
    let household = insert_household(&storage, &unique("H")).await?;
    let service = insert_service(&storage, &unique("Water")).await?;
    let (meter, _) = storage.find_or_create_meter(household, service).await?;

    let (stale, _) = storage
        .find_or_create_period(&PeriodDraft {
            period_name: unique("Q-1999"),
            period_type: BillingInterval::Quarterly,
            start_date: date(1999, 7, 1),
            end_date: date(1999, 9, 30),
            reading_deadline: date(1999, 10, 14),
        })
        .await?;
    let (recent, _) = storage.find_or_create_period(&draft(&unique("Q-keep"))).await?;
    storage.record_reading(&reading(meter.id, stale.id)).await?;
    storage.record_reading(&reading(meter.id, recent.id)).await?;

    let deletion =
        maintenance::cleanup_invalid_periods(storage.pool(), maintenance::default_cleanup_cutoff())
            .await?;

    assert!(deletion.periods_deleted >= 1);
    assert!(deletion.readings_deleted >= 1);
    assert!(storage.find_period(stale.id).await?.is_none());
    assert_eq!(storage.count_readings_for_period(stale.id).await?, 0);
    assert!(storage.find_period(recent.id).await?.is_some());
    assert_eq!(storage.count_readings_for_period(recent.id).await?, 1);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn main_meters_sorted_by_service_then_number() -> anyhow::Result<()> {
    let storage = storage().await?;
    let prefix = unique("Svc");
    let service_b = insert_service(&storage, &format!("{}-b", prefix)).await?;
    let service_a = insert_service(&storage, &format!("{}-a", prefix)).await?;
    insert_main_meter(&storage, service_b, "M1").await?;
    insert_main_meter(&storage, service_a, "M2").await?;
    insert_main_meter(&storage, service_a, "M1").await?;

    let listed: Vec<(Uuid, String)> = storage
        .list_main_meters(None)
        .await?
        .into_iter()
        .filter(|m| m.service_id == service_a || m.service_id == service_b)
        .map(|m| (m.service_id, m.meter_number))
        .collect();
    assert_eq!(
        listed,
        vec![
            (service_a, "M1".to_string()),
            (service_a, "M2".to_string()),
            (service_b, "M1".to_string()),
        ]
    );

    let only_a = storage.list_main_meters(Some(service_a)).await?;
    assert_eq!(only_a.len(), 2);
    assert!(only_a.iter().all(|m| m.service_id == service_a));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn interval_migration_can_be_rerun() -> anyhow::Result<()> {
    let storage = storage().await?;
    let name = unique("Heat");
    sqlx::query(
        "INSERT INTO utility_services (name, unit, billing_interval) VALUES ($1, 'kWh', 'annual')",
    )
    .bind(&name)
    .execute(storage.pool())
    .await?;

    let first = maintenance::migrate_billing_interval(
        &storage,
        BillingInterval::Annual,
        BillingInterval::Tertiary,
        2087,
        14,
    )
    .await?;
    assert!(first.services_updated >= 1);
    assert_eq!(first.periods_created + first.periods_reused, 3);

    let second = maintenance::migrate_billing_interval(
        &storage,
        BillingInterval::Annual,
        BillingInterval::Tertiary,
        2087,
        14,
    )
    .await?;
    assert_eq!(second.services_updated, 0);
    assert_eq!(second.periods_created, 0);
    assert_eq!(second.periods_reused, 3);

    let service = storage.find_service_by_name(&name).await?.unwrap();
    assert_eq!(service.billing_interval, BillingInterval::Tertiary);
    let t1 = storage.find_period_by_name("2087-T1").await?.unwrap();
    assert_eq!(t1.end_date, date(2087, 4, 30));
    Ok(())
}
