//! 规则文档
//!
//! 三类规则的统一载入格式。框架核心不落盘也不拉取远端，规则来源由外部
//! 协作方决定，这里只负责解析、校验与一次性套用。
//!
//! # 特性
//!
//! - **单文档三族**: 流控、熔断、热点参数规则同卷声明
//! - **JSON/YAML**: 按文件扩展名自动识别格式
//! - **先验后载**: 整卷校验通过后才逐族替换，坏文档不动现网规则

use crate::degrade::{self, DegradeRule};
use crate::error::AdmitronError;
use crate::flow_control::{self, FlowRule};
use crate::param_flow::{self, ParamFlowRule};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// 规则文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub flow: Vec<FlowRule>,
    #[serde(default)]
    pub degrade: Vec<DegradeRule>,
    #[serde(default)]
    pub param_flow: Vec<ParamFlowRule>,
}

impl RuleDocument {
    /// 校验整卷规则
    ///
    /// 空文档合法，套用后等价于清空全部规则。
    pub fn validate(&self) -> Result<(), String> {
        for (index, rule) in self.flow.iter().enumerate() {
            rule.validate()
                .map_err(|e| format!("流控规则[{}]校验失败: {}", index, e))?;
        }
        for (index, rule) in self.degrade.iter().enumerate() {
            rule.validate()
                .map_err(|e| format!("熔断规则[{}]校验失败: {}", index, e))?;
        }
        for (index, rule) in self.param_flow.iter().enumerate() {
            rule.validate()
                .map_err(|e| format!("热点参数规则[{}]校验失败: {}", index, e))?;
        }
        Ok(())
    }

    /// 从JSON文本解析
    pub fn from_json_str(text: &str) -> Result<Self, AdmitronError> {
        Ok(serde_json::from_str(text)?)
    }

    /// 从YAML文本解析
    pub fn from_yaml_str(text: &str) -> Result<Self, AdmitronError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// 从文件加载，按扩展名识别格式
    ///
    /// # 返回
    /// - `Ok(document)`: 解析成功（尚未校验、尚未套用）
    /// - `Err(AdmitronError::Config)`: 无法识别的扩展名
    /// - `Err(AdmitronError::Io / Serde / Yaml)`: 读取或解析失败
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AdmitronError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match extension {
            "yaml" | "yml" => Self::from_yaml_str(&text),
            "json" => Self::from_json_str(&text),
            other => Err(AdmitronError::Config(format!(
                "无法识别的规则文件扩展名: {:?} ({})",
                other,
                path.display()
            ))),
        }
    }

    /// 序列化为JSON文本
    pub fn to_json(&self) -> Result<String, AdmitronError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 序列化为YAML文本
    pub fn to_yaml(&self) -> Result<String, AdmitronError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// 校验并套用整卷规则
    ///
    /// 每族规则各自整体原子替换；校验失败时三族都不动。
    pub fn apply(self) -> Result<(), AdmitronError> {
        self.validate().map_err(AdmitronError::Config)?;

        let counts = (self.flow.len(), self.degrade.len(), self.param_flow.len());
        flow_control::load_flow_rules(self.flow)?;
        degrade::load_degrade_rules(self.degrade)?;
        param_flow::load_param_rules(self.param_flow)?;
        info!(
            flow = counts.0,
            degrade = counts.1,
            param_flow = counts.2,
            "规则文档已套用"
        );
        Ok(())
    }
}
