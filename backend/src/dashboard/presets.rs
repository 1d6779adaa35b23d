//! Built-in dashboards: HR analytics, generic sales, hobby-shop sales.

use super::{
    DashboardConfig, DerivedField, EventSeries, Expr, GroupBy, KpiKind, KpiSpec, Measure, SortSpec,
    Statistic, TableSpec, Template, Vocabulary,
};

/// Names accepted by [`by_name`].
pub const NAMES: [&str; 3] = ["hr", "sales", "hobby"];

pub fn by_name(name: &str) -> Option<DashboardConfig> {
    match name {
        "hr" => Some(hr()),
        "sales" => Some(sales()),
        "hobby" => Some(hobby()),
        _ => None,
    }
}

pub fn all() -> Vec<DashboardConfig> {
    vec![hr(), sales(), hobby()]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn kpi(name: &str, kind: KpiKind) -> KpiSpec {
    KpiSpec { name: name.to_string(), kind }
}

fn table(name: &str, group_by: GroupBy, measures: Vec<Measure>) -> TableSpec {
    TableSpec {
        name: name.to_string(),
        group_by,
        measures,
        required: false,
        split_by: None,
        sort: None,
        limit: None,
    }
}

fn by_column(column: &str) -> GroupBy {
    GroupBy::Column { column: column.to_string() }
}

fn by_month(column: &str) -> GroupBy {
    GroupBy::Month { column: column.to_string() }
}

fn sum(column: &str) -> Measure {
    Measure::of(Statistic::Sum, column)
}

/// Workforce, compensation, attrition and performance.
pub fn hr() -> DashboardConfig {
    let mut headcount = table("Headcount by Department", by_column("Department"), vec![Measure::count()]);
    headcount.required = true;

    let salary_spread = vec![
        Measure::of(Statistic::Min, "Salary"),
        Measure::quantile("Salary", 0.25),
        Measure::of(Statistic::Median, "Salary"),
        Measure::quantile("Salary", 0.75),
        Measure::of(Statistic::Max, "Salary"),
    ];

    DashboardConfig {
        name: "hr".into(),
        title: "HR Analytics Dashboard".into(),
        vocabulary: Vocabulary {
            categorical: strings(&["Department", "Gender", "EmploymentStatus"]),
            numeric: strings(&["Age", "Salary", "JobLevel", "PerformanceRating"]),
            temporal: strings(&["HireDate", "ExitDate"]),
            day_first: false,
        },
        derived: vec![],
        filters: strings(&["Department", "Gender"]),
        year_filter: None,
        kpis: vec![
            kpi("Total Employees", KpiKind::RowCount),
            kpi(
                "Active Employees",
                KpiKind::CountEqual { column: "EmploymentStatus".into(), value: "Active".into() },
            ),
            kpi(
                "Exited Employees",
                KpiKind::CountEqual { column: "EmploymentStatus".into(), value: "Exited".into() },
            ),
            kpi("Avg. Salary", KpiKind::Mean { column: "Salary".into() }),
        ],
        tables: vec![
            headcount,
            table("Gender Diversity", by_column("Gender"), vec![Measure::count()]),
            TableSpec {
                split_by: Some("Gender".into()),
                ..table(
                    "Age Distribution",
                    GroupBy::Bins { column: "Age".into(), count: 10 },
                    vec![Measure::count()],
                )
            },
            table("Salary Distribution by Department", by_column("Department"), salary_spread),
            table("Job Level Distribution", by_column("JobLevel"), vec![Measure::count()]),
            table("Employment Status", by_column("EmploymentStatus"), vec![Measure::count()]),
            table(
                "Hires vs Exits",
                GroupBy::Events {
                    series: vec![
                        EventSeries { label: "Hires".into(), column: "HireDate".into() },
                        EventSeries { label: "Exits".into(), column: "ExitDate".into() },
                    ],
                },
                vec![],
            ),
            table(
                "Performance Ratings",
                by_column("PerformanceRating"),
                vec![Measure::count()],
            ),
        ],
        template: Some(Template {
            columns: strings(&[
                "EmployeeID",
                "Name",
                "Department",
                "Gender",
                "Age",
                "Salary",
                "JobLevel",
                "HireDate",
                "ExitDate",
                "EmploymentStatus",
                "PerformanceRating",
            ]),
            rows: vec![
                strings(&["1", "Alice", "HR", "F", "29", "50000", "1", "2019-01-10", "", "Active", "3"]),
                strings(&["2", "Bob", "IT", "M", "34", "60000", "2", "2018-03-15", "2022-05-01", "Exited", "4"]),
                strings(&["3", "Charlie", "Finance", "M", "41", "75000", "3", "2015-07-23", "", "Active", "5"]),
            ],
        }),
    }
}

/// Sales, profit and product performance, filterable by year and region.
pub fn sales() -> DashboardConfig {
    let mut top_products = table(
        "Top Products",
        by_column("Product Name"),
        vec![sum("Sales"), sum("Profit"), sum("Quantity")],
    );
    top_products.sort = Some(SortSpec { by: "Sales".into(), descending: true });
    top_products.limit = Some(10);

    DashboardConfig {
        name: "sales".into(),
        title: "Sales Performance Dashboard".into(),
        vocabulary: Vocabulary {
            categorical: strings(&["Region", "Category", "Product Name"]),
            numeric: strings(&["Sales", "Profit", "Quantity"]),
            temporal: strings(&["Order Date"]),
            day_first: true,
        },
        derived: vec![DerivedField {
            name: "ProfitMargin".into(),
            expr: Expr::div(Expr::col("Profit"), Expr::col("Sales")),
        }],
        filters: strings(&["Region"]),
        year_filter: Some("Order Date".into()),
        kpis: vec![
            kpi("Total Sales", KpiKind::Sum { column: "Sales".into() }),
            kpi("Total Profit", KpiKind::Sum { column: "Profit".into() }),
            kpi(
                "Profit Margin %",
                KpiKind::RatioOfSums {
                    numerator: "Profit".into(),
                    denominator: "Sales".into(),
                    scale: 100.0,
                },
            ),
            kpi("Total Quantity", KpiKind::Sum { column: "Quantity".into() }),
        ],
        tables: vec![
            table("Sales Over Time", by_month("Order Date"), vec![sum("Sales")]),
            table("Profit Over Time", by_month("Order Date"), vec![sum("Profit")]),
            table("Sales by Category", by_column("Category"), vec![sum("Sales")]),
            table("Sales by Region", by_column("Region"), vec![sum("Sales")]),
            top_products,
        ],
        template: Some(Template {
            columns: strings(&["Order Date", "Region", "Category", "Product Name", "Sales", "Profit", "Quantity"]),
            rows: vec![
                strings(&["15/01/2023", "East", "Furniture", "Oak Chair", "240.00", "36.00", "2"]),
                strings(&["10/02/2023", "West", "Technology", "Desk Phone", "120.50", "18.25", "1"]),
            ],
        }),
    }
}

/// Hot Wheels sales for a hobby shop: revenue and profit derived per order.
pub fn hobby() -> DashboardConfig {
    let by_class = TableSpec {
        required: true,
        ..table(
            "Sales & Profit by Class",
            by_column("Class"),
            vec![sum("Amount Collected"), sum("Profit")],
        )
    };
    let by_location = TableSpec {
        required: true,
        ..table(
            "Sales & Profit by Location",
            by_column("Location"),
            vec![sum("Amount Collected"), sum("Profit")],
        )
    };

    DashboardConfig {
        name: "hobby".into(),
        title: "Triple Track Garage - Hot Wheels Sales Dashboard".into(),
        vocabulary: Vocabulary {
            categorical: strings(&["Location", "Class", "Buyer Name"]),
            numeric: strings(&["Price", "Quantity", "Cost"]),
            temporal: strings(&["Order Date"]),
            day_first: false,
        },
        derived: vec![
            DerivedField {
                name: "Amount Collected".into(),
                expr: Expr::mul(Expr::col("Price"), Expr::col("Quantity")),
            },
            DerivedField {
                name: "Profit".into(),
                expr: Expr::mul(
                    Expr::sub(Expr::col("Price"), Expr::col("Cost")),
                    Expr::col("Quantity"),
                ),
            },
        ],
        filters: strings(&["Location", "Class"]),
        year_filter: None,
        kpis: vec![
            kpi("Total Sales", KpiKind::Sum { column: "Amount Collected".into() }),
            kpi("Total Quantity", KpiKind::Sum { column: "Quantity".into() }),
            kpi("Unique Buyers", KpiKind::DistinctCount { column: "Buyer Name".into() }),
            kpi("Total Profit", KpiKind::Sum { column: "Profit".into() }),
        ],
        tables: vec![
            by_class,
            by_location,
            table(
                "Sales & Profit Over Time",
                by_month("Order Date"),
                vec![sum("Amount Collected"), sum("Profit")],
            ),
        ],
        template: Some(Template {
            columns: strings(&["Order Date", "Buyer Name", "Location", "Class", "Price", "Quantity", "Cost"]),
            rows: vec![
                strings(&["2023-01-15", "John Doe", "Manila", "Sports Car", "250.00", "2", "150.00"]),
                strings(&["2023-02-10", "Jane Smith", "Cebu", "Truck", "300.00", "1", "200.00"]),
            ],
        }),
    }
}
