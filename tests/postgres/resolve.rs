use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use pg_typegraph::{
    CanonicalType, Error, Generated, PgCatalog, TypeKind, TypeResolver, TypeSlot,
};

static SCHEMAS: AtomicUsize = AtomicUsize::new(0);

/// A uniquely named schema holding the types the tests resolve.
#[derive(Clone)]
struct Scratch {
    catalog: PgCatalog,
    schema: String,
}

impl Scratch {
    async fn create() -> anyhow::Result<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        let catalog = PgCatalog::from_env().await?;

        let nanos = SystemTime::now().duration_since(UNIX_EPOCH)?.subsec_nanos();
        let schema = format!(
            "typegraph_{}_{nanos}_{}",
            std::process::id(),
            SCHEMAS.fetch_add(1, Ordering::Relaxed)
        );

        let statements = [
            format!("CREATE SCHEMA {schema}"),
            format!("CREATE TYPE {schema}.user_role AS ENUM ('admin', 'customer')"),
            // sorts between the two existing labels
            format!("ALTER TYPE {schema}.user_role ADD VALUE 'auditor' BEFORE 'customer'"),
            format!(
                "CREATE TYPE {schema}.address AS \
                 (street text, city text, postal_code varchar(10), country varchar(2))"
            ),
            format!("CREATE DOMAIN {schema}.email AS text CHECK (VALUE LIKE '%@%')"),
            format!("CREATE DOMAIN {schema}.work_email AS {schema}.email"),
            format!("CREATE DOMAIN {schema}.short_code AS varchar(255)"),
            format!("CREATE DOMAIN {schema}.country_code AS {schema}.short_code"),
            format!("CREATE TYPE {schema}.validity_period AS RANGE (subtype = timestamptz)"),
            format!(
                "CREATE TABLE {schema}.account (
                    id bigint GENERATED ALWAYS AS IDENTITY,
                    email {schema}.work_email NOT NULL,
                    role {schema}.user_role DEFAULT 'customer',
                    total numeric(10,2),
                    doubled numeric GENERATED ALWAYS AS (total * 2) STORED,
                    homes {schema}.address[]
                )"
            ),
            format!("COMMENT ON COLUMN {schema}.account.email IS 'login'"),
            format!("CREATE TABLE {schema}.legacy (id int4, obsolete text, label text)"),
            format!("ALTER TABLE {schema}.legacy DROP COLUMN obsolete"),
        ];

        for statement in &statements {
            sqlx::raw_sql(statement).execute(catalog.pool()).await?;
        }

        Ok(Scratch { catalog, schema })
    }

    /// Run `check` against a fresh scratch schema, dropping the schema
    /// afterwards even if `check` fails or panics.
    async fn run<F, Fut>(check: F) -> anyhow::Result<()>
    where
        F: FnOnce(Scratch) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let scratch = Scratch::create().await?;

        let outcome = tokio::spawn(check(scratch.clone())).await;

        scratch.drop_schema().await?;

        match outcome {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(e.into()),
        }
    }

    fn resolver(&self) -> TypeResolver {
        TypeResolver::new(self.catalog.clone())
    }

    fn qualify(&self, name: &str) -> String {
        format!("{}.{name}", self.schema)
    }

    async fn drop_schema(self) -> anyhow::Result<()> {
        sqlx::raw_sql(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(self.catalog.pool())
            .await?;

        Ok(())
    }
}

fn resolved(slot: &TypeSlot) -> &CanonicalType {
    slot.get().expect("slot should be filled")
}

#[tokio::test]
async fn it_resolves_base_types() -> anyhow::Result<()> {
    Scratch::run(|scratch| async move {
        let mut resolver = scratch.resolver();

        let int4 = resolver.enqueue("pg_catalog.int4");
        let text_array = resolver.enqueue("text[]");
        let numeric = resolver.enqueue("numeric(10,2)[]");
        let internal = resolver.enqueue("_text");
        let varchar = resolver.enqueue("character varying(10)[][]");

        resolver.resolve_all().await?;

        let int4 = resolved(&int4);
        assert_eq!(int4.kind, TypeKind::Base);
        assert_eq!(int4.schema, "pg_catalog");
        assert_eq!(int4.name, "int4");
        assert_eq!(int4.dimensions, 0);

        assert_eq!(resolved(&text_array).name, "text");
        assert_eq!(resolved(&text_array).dimensions, 1);

        let numeric = resolved(&numeric);
        assert_eq!(numeric.name, "numeric");
        assert_eq!(numeric.modifiers.as_deref(), Some("10,2"));
        assert_eq!(numeric.dimensions, 1);

        assert_eq!(resolved(&internal).canonical_name, "pg_catalog.text");
        assert_eq!(resolved(&internal).dimensions, 1);

        assert_eq!(resolved(&varchar).canonical_name, "pg_catalog.varchar");
        assert_eq!(resolved(&varchar).dimensions, 2);

        assert_eq!(resolver.stats().round_trips, 1);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn it_resolves_user_defined_kinds() -> anyhow::Result<()> {
    Scratch::run(|scratch| async move {
        let mut resolver = scratch.resolver();

        let address = resolver.enqueue(scratch.qualify("address"));
        let email = resolver.enqueue(scratch.qualify("work_email"));
        let role = resolver.enqueue(scratch.qualify("user_role"));
        let period = resolver.enqueue(scratch.qualify("validity_period"));

        resolver.resolve_all().await?;

        let attributes = resolved(&address)
            .attributes()
            .expect("address is a composite");

        let names: Vec<_> = attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["street", "city", "postal_code", "country"]);
        assert!(attributes.iter().all(|a| a.ty.is_filled()));
        assert_eq!(resolved(&attributes[2].ty).name, "varchar");
        assert_eq!(resolved(&attributes[2].ty).modifiers.as_deref(), Some("10"));

        let base = resolved(&email).domain_base_type().expect("base type is resolved");
        assert_eq!(base.kind, TypeKind::Base);
        assert_eq!(base.name, "text");

        assert_eq!(
            resolved(&role).enum_values(),
            Some(&["admin".to_string(), "auditor".to_string(), "customer".to_string()][..])
        );

        let subtype = resolved(&period).range_subtype().expect("subtype is resolved");
        assert_eq!(subtype.kind, TypeKind::Base);
        assert_eq!(subtype.name, "timestamptz");

        Ok(())
    })
    .await
}

#[tokio::test]
async fn it_resolves_table_row_types() -> anyhow::Result<()> {
    Scratch::run(|scratch| async move {
        let mut resolver = scratch.resolver();

        let account = resolver.enqueue(scratch.qualify("account"));
        resolver.enqueue(scratch.qualify("address"));
        resolver.enqueue(scratch.qualify("user_role"));

        resolver.resolve_all().await?;

        let attributes = resolved(&account)
            .attributes()
            .expect("row types are composites");

        let names: Vec<_> = attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["id", "email", "role", "total", "doubled", "homes"]);

        let id = &attributes[0];
        assert!(id.is_identity);
        assert!(!id.is_nullable);
        assert_eq!(id.generated, Generated::Always);
        assert_eq!(resolved(&id.ty).name, "int8");

        let email = &attributes[1];
        assert_eq!(email.comment.as_deref(), Some("login"));
        assert!(matches!(resolved(&email.ty).kind, TypeKind::Domain { .. }));

        let role = &attributes[2];
        assert!(role.is_nullable);
        assert_eq!(role.generated, Generated::Never);
        assert!(role
            .default_value
            .as_deref()
            .is_some_and(|default| default.contains("customer")));

        assert_eq!(resolved(&attributes[3].ty).modifiers.as_deref(), Some("10,2"));
        assert_eq!(attributes[4].generated, Generated::Always);
        assert!(!attributes[4].is_identity);

        let homes = resolved(&attributes[5].ty);
        assert_eq!(homes.dimensions, 1);
        assert_eq!(homes.canonical_name, scratch.qualify("address"));
        assert_eq!(homes.attributes().map(<[_]>::len), Some(4));

        // depth 1: basic, enum, composite; depth 2: basic, domain; depth 3: cached
        let stats = resolver.stats();
        assert_eq!(stats.depths, 3);
        assert_eq!(stats.round_trips, 5);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn it_produces_equal_trees_across_sessions() -> anyhow::Result<()> {
    Scratch::run(|scratch| async move {
        let requests = [
            scratch.qualify("account"),
            scratch.qualify("validity_period[]"),
            "numeric(10,2)".to_string(),
        ];

        let mut trees = Vec::new();

        for _ in 0..2 {
            let mut resolver = scratch.resolver();
            let slots: Vec<_> = requests.iter().map(|text| resolver.enqueue(text.as_str())).collect();

            resolver.resolve_all().await?;

            trees.push(slots.iter().map(|slot| resolved(slot).clone()).collect::<Vec<_>>());
        }

        assert_eq!(trees[0], trees[1]);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn it_fails_without_filling_anything() -> anyhow::Result<()> {
    Scratch::run(|scratch| async move {
        let mut resolver = scratch.resolver();

        let address = resolver.enqueue(scratch.qualify("address"));
        let missing = resolver.enqueue(scratch.qualify("does_not_exist"));

        let err = resolver.resolve_all().await.unwrap_err();

        assert!(
            matches!(&err, Error::UnresolvableName { type_text } if *type_text == scratch.qualify("does_not_exist")),
            "{err:?}"
        );
        assert!(!address.is_filled());
        assert!(!missing.is_filled());
        assert_eq!(resolver.stats().resolved_types, 0);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn it_keeps_the_modifiers_of_domain_bases() -> anyhow::Result<()> {
    Scratch::run(|scratch| async move {
        let mut resolver = scratch.resolver();

        let country_code = resolver.resolve_one(scratch.qualify("country_code")).await?;

        let base = country_code.domain_base_type().expect("base type is resolved");
        assert_eq!(base.kind, TypeKind::Base);
        assert_eq!(base.canonical_name, "pg_catalog.varchar");
        assert_eq!(base.modifiers.as_deref(), Some("255"));

        Ok(())
    })
    .await
}

#[tokio::test]
async fn it_skips_dropped_columns() -> anyhow::Result<()> {
    Scratch::run(|scratch| async move {
        let mut resolver = scratch.resolver();

        let legacy = resolver.resolve_one(scratch.qualify("legacy")).await?;

        let attributes = legacy.attributes().expect("row types are composites");
        let names: Vec<_> = attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["id", "label"]);
        assert_eq!(attributes[1].ordinal_index, 3);

        Ok(())
    })
    .await
}
