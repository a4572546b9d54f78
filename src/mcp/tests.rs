//! Tool definition tests

mod tool_definition_tests {
    use crate::config::QueryConfig;
    use crate::mcp::tools::{
        AllTableNamesHandler, ExecuteQueryHandler, FilterTableNamesHandler,
        SchemaDefinitionsHandler,
    };
    use std::path::PathBuf;

    const DB_INFO: &str =
        "Connected to sqlite version 3.45.1 database 'app.db' on None as user 'None'";

    #[test]
    fn all_table_names_tool_definition() {
        let tool = AllTableNamesHandler::tool_definition(DB_INFO);

        assert_eq!(tool.name, "all_table_names");
        assert_eq!(
            tool.description,
            Some(format!(
                "Return all table names in the database separated by comma. {}",
                DB_INFO
            ))
        );

        let properties = tool.input_schema["properties"]
            .as_object()
            .expect("has properties");
        assert!(properties.is_empty());
    }

    #[test]
    fn filter_table_names_tool_definition() {
        let tool = FilterTableNamesHandler::tool_definition(DB_INFO);

        assert_eq!(tool.name, "filter_table_names");
        assert!(
            tool.description
                .as_deref()
                .expect("has description")
                .starts_with("Return all table names in the database containing the substring 'q'")
        );

        let schema = tool.input_schema;
        assert_eq!(schema["properties"]["q"]["type"], "string");
        let required = schema["required"].as_array().expect("has required array");
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "q");
    }

    #[test]
    fn schema_definitions_tool_definition() {
        let tool = SchemaDefinitionsHandler::tool_definition(DB_INFO);

        assert_eq!(tool.name, "schema_definitions");
        assert!(
            tool.description
                .as_deref()
                .expect("has description")
                .ends_with(DB_INFO)
        );

        let table_names = &tool.input_schema["properties"]["table_names"];
        assert_eq!(table_names["type"], "array");
        assert_eq!(table_names["items"]["type"], "string");
    }

    #[test]
    fn execute_query_description_without_local_files() {
        let settings = QueryConfig {
            max_chars: 1234,
            local_files_path: None,
        };
        let tool = ExecuteQueryHandler::tool_definition(DB_INFO, &settings);

        assert_eq!(tool.name, "execute_query");
        assert_eq!(
            tool.description,
            Some(format!(
                "Execute a SQL query and return results in a readable format. \
                 Results will be truncated after 1234 characters. {}",
                DB_INFO
            ))
        );

        let schema = tool.input_schema;
        let required = schema["required"].as_array().expect("has required array");
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "query");
        assert!(schema["properties"]["params"].is_object());
    }

    #[test]
    fn execute_query_description_mentions_full_results() {
        let settings = QueryConfig {
            max_chars: 4000,
            local_files_path: Some(PathBuf::from("/tmp/claude-files")),
        };
        let description = ExecuteQueryHandler::tool_definition(DB_INFO, &settings)
            .description
            .expect("has description");

        assert!(description.contains(
            "characters. Claude Desktop may fetch the full result set via an url for analysis and artifacts. Connected to"
        ));
    }
}

mod error_message_tests {
    use crate::mcp::tools::error_message;
    use std::fmt;

    /// Mimics sqlx, whose database errors repeat their source in `Display`
    #[derive(Debug)]
    struct Wrapped(DatabaseMessage);

    #[derive(Debug)]
    struct DatabaseMessage;

    impl fmt::Display for DatabaseMessage {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "(code: 1) no such table: nope")
        }
    }

    impl std::error::Error for DatabaseMessage {}

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "error returned from database: {}", self.0)
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn repeated_sources_are_dropped() {
        let error = anyhow::Error::new(Wrapped(DatabaseMessage));
        assert_eq!(
            error_message(&error),
            "error returned from database: (code: 1) no such table: nope"
        );
    }

    #[test]
    fn distinct_context_is_kept() {
        let error = anyhow::anyhow!("connection refused").context("Failed to list tables");
        assert_eq!(
            error_message(&error),
            "Failed to list tables: connection refused"
        );
    }
}
