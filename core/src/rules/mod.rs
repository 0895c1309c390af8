// 自定义规则: 模型与加载
pub mod loader;
pub mod model;
