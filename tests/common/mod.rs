#![allow(dead_code)]

use std::path::{Path, PathBuf};

use buildlens::entity::{InstancedFv, InstancedModule, ModuleDescriptor, Package, SourceFile};
use buildlens::{Edge, EnvId, Environment, ReportDb, TableTag};
use rusqlite::types::ValueRef;

/// One single-environment build: a package with one component that links
/// one library, both placed in firmware volume `FVMAIN`.
pub struct Build<'a> {
    pub env: i64,
    pub date: &'a str,
    pub platform: &'a str,
    pub package: &'a str,
    pub repository: &'a str,
}

impl Build<'_> {
    pub fn component(&self) -> String {
        format!("{}/App/App.inf", self.package)
    }

    pub fn library(&self) -> String {
        format!("{}/Library/Lib.inf", self.package)
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        let db = ReportDb::create(path).unwrap();
        let env = EnvId(self.env);
        let component = self.component();
        let library = self.library();
        let class = format!("{}Lib", self.package);
        let component_src = format!("{}/App/App.c", self.package);
        let library_src = format!("{}/Library/Lib.c", self.package);

        db.insert_environment(
            &Environment::new(self.env, "1.0", self.date).with_value("PLATFORM_NAME", self.platform),
        )
        .unwrap();
        db.insert_package(&Package::new(self.package, self.repository)).unwrap();
        db.insert_module(&ModuleDescriptor::component(component.as_str(), self.package)).unwrap();
        db.insert_module(&ModuleDescriptor::library(library.as_str(), class.as_str(), self.package)).unwrap();
        db.insert_source(&SourceFile::new(component_src.as_str(), 100)).unwrap();
        db.insert_source(&SourceFile::new(library_src.as_str(), 50)).unwrap();

        db.insert_instanced_fv(&InstancedFv::new(env, "FVMAIN")).unwrap();
        db.insert_instanced_module(&InstancedModule::new(env, component.as_str(), component.as_str(), None))
            .unwrap();
        db.insert_instanced_module(&InstancedModule::new(
            env,
            library.as_str(),
            component.as_str(),
            Some(class.as_str()),
        ))
        .unwrap();

        let edges = [
            Edge::link(env, TableTag::Package, self.package, TableTag::Inf, component.as_str()),
            Edge::link(env, TableTag::Package, self.package, TableTag::Inf, library.as_str()),
            Edge::link(env, TableTag::InstancedFv, "FVMAIN", TableTag::InstancedInf, component.as_str()),
            Edge::link(env, TableTag::InstancedInf, component.as_str(), TableTag::Source, component_src.as_str()),
            Edge::link(env, TableTag::InstancedInf, library.as_str(), TableTag::Source, library_src.as_str()),
            Edge::link(env, TableTag::InstancedInf, component.as_str(), TableTag::InstancedInf, library.as_str()),
        ];
        for edge in &edges {
            db.insert_edge(edge).unwrap();
        }
        db.close().unwrap();
        path.to_path_buf()
    }
}

/// Every row of `table` rendered as text, sorted
pub fn dump_table(path: &Path, table: &str) -> Vec<Vec<String>> {
    let conn = rusqlite::Connection::open(path).unwrap();
    let mut stmt = conn.prepare(&format!("SELECT * FROM \"{}\"", table)).unwrap();
    let width = stmt.column_count();
    let mut rows: Vec<Vec<String>> = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| {
                    Ok(match row.get_ref(i)? {
                        ValueRef::Null => "NULL".to_string(),
                        ValueRef::Integer(v) => v.to_string(),
                        ValueRef::Real(v) => v.to_string(),
                        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
                    })
                })
                .collect()
        })
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    rows.sort();
    rows
}
