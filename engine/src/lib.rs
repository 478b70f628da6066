#![allow(clippy::too_many_arguments)]

use anyhow::Result;
use log::*;
use renderer::Renderer;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

mod renderer;
mod vulkan;

/// Application shell: owns the window and the renderer and pumps events.
#[derive(Debug)]
pub struct Engine {
    window: Window,
    renderer: Renderer,
    event_loop: EventLoop<()>,
}

impl Engine {
    pub fn new() -> Result<Engine> {
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title("Vulkan Sandbox")
            .with_inner_size(LogicalSize::new(1240, 720))
            .build(&event_loop)?;

        let renderer = unsafe { Renderer::create(&window)? };

        Ok(Engine {
            window,
            renderer,
            event_loop,
        })
    }

    pub fn run(self) -> Result<()> {
        let Engine {
            window,
            mut renderer,
            event_loop,
        } = self;

        // While the window has no drawable area we keep draining events
        // (so a quit still lands) but never touch the swapchain.
        let mut minimized = false;

        event_loop.run(move |event, elwt| match event {
            Event::AboutToWait => window.request_redraw(),
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::RedrawRequested if !elwt.exiting() && !minimized => {
                    if let Err(err) = unsafe { renderer.render(&window) } {
                        error!("frame failed: {err:#}");
                        elwt.exit();
                    }
                }
                WindowEvent::Resized(size) => {
                    if size.width == 0 || size.height == 0 {
                        minimized = true;
                    } else {
                        minimized = false;
                        renderer.mark_resized();
                    }
                }
                WindowEvent::CloseRequested => elwt.exit(),
                _ => {}
            },
            _ => {}
        })?;

        Ok(())
    }
}
