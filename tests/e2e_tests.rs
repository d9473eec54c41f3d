//! End-to-end integration tests
//!
//! These tests drive the whole stack the way a front end does:
//! 1. A workbook fixture (one CSV per sheet) is copied to a scratch directory
//! 2. A command runs through the CLI dispatch or the service facade
//! 3. The JSON result, the written files, or the rewritten workbook are checked
//!
//! Workbook fixtures are located in tests/fixtures/. `riverside` holds two
//! estimates, their orders, one invoice, a confirmed and a cancelled deposit,
//! and one payment.

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use project_ledger_engine::cli::{execute, CliArgs, Command};
    use project_ledger_engine::core::journal::{JournalExport, JournalRequest};
    use project_ledger_engine::grid::{FixedClock, MemoryGrid};
    use project_ledger_engine::{
        load_workbook, save_workbook, Backends, Deposit, Estimate, Invoice, LedgerConfig,
        LedgerService, Payment,
    };
    use project_ledger_engine::types::{EstimateHeader, EstimateItem};
    use rstest::rstest;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::str::FromStr;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Copy tests/fixtures/{fixture_name} into a fresh scratch directory
    fn scratch_workbook(fixture_name: &str) -> TempDir {
        let fixture_dir = Path::new("tests/fixtures").join(fixture_name);
        assert!(
            fixture_dir.exists(),
            "Fixture not found: {}",
            fixture_dir.display()
        );
        let scratch = TempDir::new().expect("Failed to create scratch dir");
        for entry in fs::read_dir(&fixture_dir).expect("Failed to list fixture") {
            let path = entry.expect("Failed to read fixture entry").path();
            let target = scratch.path().join(path.file_name().unwrap());
            fs::copy(&path, &target).expect("Failed to copy fixture file");
        }
        scratch
    }

    fn run(dir: &Path, command: Command) -> Value {
        let args = CliArgs {
            data_dir: dir.to_path_buf(),
            config: None,
            command,
        };
        execute(&args).unwrap_or_else(|e| panic!("command failed: {}", e))
    }

    /// Money from a JSON field, whether serialized as string or number
    fn money(value: &Value) -> Decimal {
        match value {
            Value::String(s) => Decimal::from_str(s).unwrap(),
            Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
            other => panic!("not a money value: {}", other),
        }
    }

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn test_summaries_from_workbook() {
        let book = scratch_workbook("riverside");
        let output = run(book.path(), Command::Summaries);
        let rows = output.as_array().unwrap();
        assert_eq!(rows.len(), 2);

        // newest estimate first
        assert_eq!(rows[0]["id"], "0000002-00");
        assert_eq!(money(&rows[0]["sales"]), dec(32000));
        assert_eq!(money(&rows[0]["cost"]), dec(20000));

        let riverside = &rows[1];
        assert_eq!(riverside["id"], "0000001-00");
        assert_eq!(money(&riverside["sales"]), dec(100000));
        assert_eq!(money(&riverside["cost"]), dec(40000));
        assert_eq!(money(&riverside["invoiced"]), dec(35000));
        // the cancelled deposit is excluded
        assert_eq!(money(&riverside["deposited"]), dec(50000));
        assert_eq!(money(&riverside["profit"]), dec(60000));
    }

    #[rstest]
    #[case::exact_name("North Steel", 40000, 35000)]
    #[case::partial_name("north", 0, 0)]
    #[case::name_with_spaces(" North  Steel ", 40000, 35000)]
    #[case::other_vendor("Clear Glass", 0, 0)]
    fn test_vendor_balance(
        #[case] vendor: &str,
        #[case] ordered: i64,
        #[case] invoiced: i64,
    ) {
        let book = scratch_workbook("riverside");
        let output = run(
            book.path(),
            Command::Balance {
                construction_id: "0000001-00".to_string(),
                vendor: vendor.to_string(),
            },
        );
        assert_eq!(money(&output["ordered"]), dec(ordered));
        assert_eq!(money(&output["invoiced"]), dec(invoiced));
        assert_eq!(money(&output["balance"]), dec(ordered - invoiced));
    }

    #[test]
    fn test_analysis_by_month() {
        let book = scratch_workbook("riverside");
        let output = run(book.path(), Command::Analysis { year: 2024 });
        let months = output["months"].as_array().unwrap();
        assert_eq!(months.len(), 12);
        assert_eq!(money(&months[2]["sales"]), dec(100000));
        assert_eq!(money(&months[4]["sales"]), dec(32000));
        assert_eq!(money(&months[0]["sales"]), Decimal::ZERO);
        assert_eq!(output["ranking"][0]["client"], "Acme Builders");
        assert_eq!(output["ranking"][1]["client"], "Beta Homes");

        let empty = run(book.path(), Command::Analysis { year: 2023 });
        assert!(empty["ranking"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_project_ledger() {
        let book = scratch_workbook("riverside");
        let output = run(
            book.path(),
            Command::Ledger {
                id: "0000001-00".to_string(),
            },
        );
        assert_eq!(output["estimate"]["header"]["project"], "Riverside Hall");
        assert_eq!(output["estimate"]["items"].as_array().unwrap().len(), 2);
        assert_eq!(output["deposits"].as_array().unwrap().len(), 1);
        assert_eq!(money(&output["paid"]), dec(35000));
        assert_eq!(money(&output["profit_rate"]), dec(60));
    }

    #[test]
    fn test_ledger_for_unknown_project_fails() {
        let book = scratch_workbook("riverside");
        let args = CliArgs {
            data_dir: book.path().to_path_buf(),
            config: None,
            command: Command::Ledger {
                id: "0000404-00".to_string(),
            },
        };
        assert!(execute(&args).is_err());
    }

    #[test]
    fn test_delete_rewrites_workbook() {
        let book = scratch_workbook("riverside");
        let delete = || {
            run(
                book.path(),
                Command::Delete {
                    id: "DEP-20240311-00001".to_string(),
                },
            )
        };
        assert_eq!(delete()["success"], true);
        let deposits = fs::read_to_string(book.path().join("Deposits.csv")).unwrap();
        assert!(!deposits.contains("DEP-20240311-00001"));
        assert!(deposits.contains("DEP-20240310-00001"));

        let again = delete();
        assert_eq!(again["success"], false);
        assert_eq!(again["message"], "Not found");
    }

    #[test]
    fn test_journal_writes_file_and_seeds_config() {
        let book = scratch_workbook("riverside");
        let out = TempDir::new().unwrap();
        let output = run(
            book.path(),
            Command::Journal {
                year: 2024,
                month: 3,
                no_sales: false,
                no_purchases: false,
                out: Some(out.path().to_path_buf()),
            },
        );
        assert_eq!(output["success"], true);
        assert!(output["count"].as_u64().unwrap() >= 2);

        let path = PathBuf::from(output["file"].as_str().unwrap());
        assert_eq!(path.parent(), Some(out.path()));
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with("\u{FEFF}".as_bytes()));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"North Steel\""));
        assert!(text.contains("\r\n"));

        assert!(book.path().join("JournalConfig.csv").exists());
    }

    #[test]
    fn test_journal_for_empty_month() {
        let book = scratch_workbook("riverside");
        let output = run(
            book.path(),
            Command::Journal {
                year: 2023,
                month: 1,
                no_sales: false,
                no_purchases: false,
                out: None,
            },
        );
        assert_eq!(output["success"], false);
        assert_eq!(output["message"], "No data");
    }

    #[test]
    fn test_workbook_round_trip() {
        let book = scratch_workbook("riverside");
        let grid = MemoryGrid::new();
        assert_eq!(load_workbook(book.path(), &grid).unwrap(), 5);

        let copy = TempDir::new().unwrap();
        assert_eq!(save_workbook(copy.path(), &grid).unwrap(), 5);
        let reloaded = MemoryGrid::new();
        load_workbook(copy.path(), &reloaded).unwrap();
        for sheet in grid.sheet_names() {
            assert_eq!(reloaded.sheet_rows(&sheet), grid.sheet_rows(&sheet), "sheet {}", sheet);
        }
    }

    #[test]
    fn test_missing_workbook_loads_nothing() {
        let scratch = TempDir::new().unwrap();
        let grid = MemoryGrid::new();
        assert_eq!(load_workbook(&scratch.path().join("absent"), &grid).unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // Service scenarios against an in-memory workbook
    // -----------------------------------------------------------------------

    fn service() -> LedgerService {
        let clock = Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2024, 3, 25)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        ));
        let backends = Backends::with_grid(Arc::new(MemoryGrid::new()), clock);
        LedgerService::new(LedgerConfig::default(), backends)
    }

    fn seed(service: &LedgerService) -> String {
        let result = service.save_estimate(Estimate {
            header: EstimateHeader {
                client: "Acme Builders".to_string(),
                project: "Riverside Hall".to_string(),
                ..Default::default()
            },
            items: vec![EstimateItem {
                product: "Steel beam".to_string(),
                qty: dec(2),
                cost: dec(20000),
                price: dec(50000),
                amount: dec(100000),
                vendor: "North Steel".to_string(),
                ..Default::default()
            }],
        });
        let id = result.id.unwrap();
        for (supplier, amount) in [("North Steel", 35000), ("Clear Glass", 12000)] {
            assert!(service
                .save_invoice(Invoice {
                    id: format!("INV-{}", amount),
                    construction_id: id.clone(),
                    supplier: supplier.to_string(),
                    date: NaiveDate::from_ymd_opt(2024, 3, 5),
                    amount: dec(amount),
                    ..Default::default()
                })
                .success);
        }
        assert!(service
            .save_deposit(Deposit {
                estimate_id: id.clone(),
                client: "Acme Builders".to_string(),
                amount: dec(50000),
                ..Default::default()
            })
            .success);
        assert!(service
            .save_payment(Payment {
                supplier: "North Steel".to_string(),
                method: "cash".to_string(),
                amount: dec(35000),
                ..Default::default()
            })
            .success);
        id
    }

    #[test]
    fn test_journal_export_is_deterministic() {
        let service = service();
        seed(&service);
        let request = JournalRequest {
            year: 2024,
            month: 3,
            include_sales: true,
            include_purchases: true,
        };
        let first = service.journal_export(&request).unwrap();
        let second = service.journal_export(&request).unwrap();
        let (JournalExport::File(first), JournalExport::File(second)) = (first, second) else {
            panic!("expected journal files");
        };
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.file_name, "集計表_2024年3月.csv");
    }

    #[test]
    fn test_journal_years_from_dated_records() {
        let service = service();
        assert_eq!(service.journal_years().unwrap(), vec![2024]);
        seed(&service);
        assert_eq!(service.journal_years().unwrap(), vec![2024]);
    }

    #[test]
    fn test_ledger_document_published() {
        let service = service();
        let id = seed(&service);
        let result = service.publish_ledger(&id);
        assert!(result.success, "{:?}", result.message);
        assert_eq!(result.id.as_deref(), Some(id.as_str()));
        assert!(result.url.is_some());
    }

    #[test]
    fn test_masters_and_products() {
        let service = service();
        seed(&service);
        let masters = service.masters().unwrap();
        assert_eq!(masters.clients, vec!["Acme Builders"]);
        assert!(masters.vendors.contains(&"Clear Glass".to_string()));
        assert!(masters.vendors.contains(&"North Steel".to_string()));

        let products = service.products().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product, "Steel beam");
        assert_eq!(products[0].price, dec(50000));
    }
}
