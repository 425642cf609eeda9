use crate::models::*;
use crate::registry::Registry;

const SCENARIO_TERMS: &[DenominatorTerm] = &[
    DenominatorTerm::plus("new"),
    DenominatorTerm::minus("suspended"),
];

/// Metric `m = judged / (new - suspended) * 100`.
pub(crate) const SCENARIO_METRIC: MetricDefinition = MetricDefinition {
    id: "m",
    numerator_field: "judged",
    denominator_terms: SCENARIO_TERMS,
    multiplier: 100.0,
};

/// Create a Registry holding only the scenario metric.
pub(crate) fn scenario_registry() -> Registry {
    Registry::new(vec![SCENARIO_METRIC]).unwrap()
}

/// Partition A: group X with judged=[10,20], new=[15,15], suspended=[0,0].
pub(crate) fn scenario_partition_a() -> Partition {
    Partition::new("A", ["group", "judged", "new", "suspended"])
        .with_row([Cell::from("X"), 10.0.into(), 15.0.into(), 0.0.into()])
        .with_row([Cell::from("X"), 20.0.into(), 15.0.into(), 0.0.into()])
}

/// Partition B: group X with judged=[5], new=[10], suspended=[5].
pub(crate) fn scenario_partition_b() -> Partition {
    Partition::new("B", ["group", "judged", "new", "suspended"]).with_row([
        Cell::from("X"),
        5.0.into(),
        10.0.into(),
        5.0.into(),
    ])
}

/// Columns read by the built-in registry, preceded by the default group field.
pub(crate) const BUILTIN_COLUMNS: [&str; 6] = [
    "ramo_justica",
    "julgados_2025",
    "casos_novos_2025",
    "dessobrestados_2025",
    "suspensos_2025",
    "distribuidos_2025",
];

/// Create a Partition with the built-in schema and two rows for group "Estadual".
pub(crate) fn builtin_partition() -> Partition {
    Partition::new("builtin", BUILTIN_COLUMNS)
        .with_row([
            Cell::from("Estadual"),
            10.0.into(),
            20.0.into(),
            1.0.into(),
            1.0.into(),
            25.0.into(),
        ])
        .with_row([
            Cell::from("Estadual"),
            20.0.into(),
            20.0.into(),
            1.0.into(),
            1.0.into(),
            25.0.into(),
        ])
}

/// Semicolon-separated CSV with the built-in schema and three groups.
pub(crate) const BUILTIN_CSV: &str = "\
ramo_justica;julgados_2025;casos_novos_2025;dessobrestados_2025;suspensos_2025;distribuidos_2025
Estadual;10;20;1;1;25
Federal;5;4;0;0;8
Estadual;20;20;1;1;25
Trabalho;7;0;0;0;0
Federal;3;4;0;0;8
Estadual;;NA;0;0;5
Eleitoral;1;2;0;0;2
Trabalho;2;0;0;0;0
";
