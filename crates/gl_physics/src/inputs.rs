// crates/gl_physics/src/inputs.rs

//! 输入字段集合
//!
//! 外部数据（NetCDF 等）以变量名为键交给核心，这里是唯一按名字查找的地方。
//! 插入时即把填充值替换为 `NaN`。

use std::collections::BTreeMap;

use gl_foundation::field::sanitize_missing;
use gl_foundation::{Field, GlError, GlResult, Grid};

/// 按变量名组织的输入字段
#[derive(Debug, Clone, Default)]
pub struct InputFields {
    fields: BTreeMap<String, Field>,
}

impl InputFields {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式插入
    pub fn with(mut self, name: impl Into<String>, field: Field) -> Self {
        self.insert(name, field);
        self
    }

    /// 插入字段（填充值转为 NaN）
    pub fn insert(&mut self, name: impl Into<String>, mut field: Field) {
        sanitize_missing(&mut field);
        self.fields.insert(name.into(), field);
    }

    /// 查询字段
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// 按优先顺序查询第一个存在的字段
    pub fn first_of(&self, names: &[&str]) -> Option<&Field> {
        names.iter().find_map(|n| self.fields.get(*n))
    }

    /// 是否包含字段
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// 字段名列表
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// 检查所有字段形状与网格一致
    pub fn validate_shapes(&self, grid: &Grid) -> GlResult<()> {
        for (name, field) in &self.fields {
            GlError::check_shape(name.clone(), grid.shape(), field.dim())?;
        }
        Ok(())
    }
}
