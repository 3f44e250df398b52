use solis_winit_app::app::WinitApp;

fn main() -> anyhow::Result<()> {
    WinitApp::run()
}
